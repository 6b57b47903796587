pub mod cert_utils;
pub mod certificates;

pub use cert_utils::{CertificateDecoder, OpensslCertificateDecoder, TransportCertificate};
pub use certificates::resolve_certificates;
