mod catalogue;
mod fingerprint;
mod model;

pub use catalogue::{
    load_catalogue, CatalogueSource, ControlCatalogue, DirectoryCatalogue, PackageDefinition,
};
pub use fingerprint::update_set_fingerprint;
pub use model::{
    current_unix_timestamp, PackageRecord, PackageSummary, PackageUpdate, ServiceRecord,
    UpdateSet, UpdateSetState, UpgradableInfo,
};

#[cfg(test)]
mod tests;
