// Entity Models
//
// Every entity is a derived, read-only output of one extraction pass.
// Relations reference entries and organizations by natural key only.

pub mod registry;
pub mod classification;
pub mod organization;

pub use registry::{RegistryEntry, RegistryType};
pub use classification::{ClassificationCode, CodeRelation, Taxonomy};
pub use organization::{
    Organization, PartnerRelation, Role, RoleSet, UnidentifiedRelation,
    certifier_only, is_siret,
};
