pub mod actor;
pub mod challenge;
pub mod issuer;
pub mod store;

pub use actor::{CertActorArgs, CertHandle, CertStatus};
pub use issuer::{HttpIssuer, IssuedCert, Issuer};
pub use store::{CertStore, StoredCert};
