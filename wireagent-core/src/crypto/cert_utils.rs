//! Certificate primitives: transport key pair generation, CMS bundle
//! decryption and thumbprint computation.

use std::fs;
use std::path::{Path, PathBuf};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::cms::CmsContentInfo;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use tracing::info;

use crate::types::{DocumentKind, ProtocolError, Result};

/// Cryptographic operations behind certificate-bundle decoding.
///
/// The resolver in [`crate::crypto::certificates`] is pure protocol logic;
/// everything that touches key material goes through this trait.
pub trait CertificateDecoder: Send + Sync {
    /// Decrypts the fabric's DER bundle and returns its contents as PEM
    /// text: private keys and certificates, keys preceding their
    /// certificates.
    fn decrypt_bundle(&self, bundle: &[u8]) -> Result<String>;

    /// SHA-1 thumbprint of one PEM certificate, uppercase hex without
    /// separators.
    fn thumbprint(&self, cert_pem: &str) -> Result<String>;
}

/// Self-signed transport certificate the fabric encrypts the bundle to.
///
/// The public half is sent base64 encoded in the
/// `x-ms-guest-agent-public-x509-cert` header on the certificates GET; the
/// private half decrypts the response.
pub struct TransportCertificate {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl TransportCertificate {
    pub fn in_dir(dir: &Path) -> Self {
        TransportCertificate {
            cert_path: dir.join("TransportCert.pem"),
            key_path: dir.join("TransportPrivate.pem"),
        }
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Generates the key pair on first use; later calls are no-ops.
    pub fn ensure(&self) -> Result<()> {
        if self.cert_path.exists() && self.key_path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.cert_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let rsa = Rsa::generate(2048).map_err(crypto_err)?;
        let pkey = PKey::from_rsa(rsa).map_err(crypto_err)?;

        let mut name = X509NameBuilder::new().map_err(crypto_err)?;
        name.append_entry_by_nid(Nid::COMMONNAME, "LinuxTransport")
            .map_err(crypto_err)?;
        let name = name.build();

        let mut builder = X509Builder::new().map_err(crypto_err)?;
        builder.set_version(2).map_err(crypto_err)?;
        let serial = BigNum::from_u32(1)
            .and_then(|bn| bn.to_asn1_integer())
            .map_err(crypto_err)?;
        builder.set_serial_number(&serial).map_err(crypto_err)?;
        builder.set_subject_name(&name).map_err(crypto_err)?;
        builder.set_issuer_name(&name).map_err(crypto_err)?;
        let not_before = Asn1Time::days_from_now(0).map_err(crypto_err)?;
        builder.set_not_before(&not_before).map_err(crypto_err)?;
        let not_after = Asn1Time::days_from_now(3650).map_err(crypto_err)?;
        builder.set_not_after(&not_after).map_err(crypto_err)?;
        builder.set_pubkey(&pkey).map_err(crypto_err)?;
        builder
            .sign(&pkey, MessageDigest::sha256())
            .map_err(crypto_err)?;
        let cert = builder.build();

        fs::write(&self.cert_path, cert.to_pem().map_err(crypto_err)?)?;
        fs::write(
            &self.key_path,
            pkey.private_key_to_pem_pkcs8().map_err(crypto_err)?,
        )?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.key_path, fs::Permissions::from_mode(0o400))?;
        }
        info!(cert = %self.cert_path.display(), "generated transport certificate");
        Ok(())
    }

    /// Base64 certificate body (PEM armor stripped) for the wire
    /// authentication header.
    pub fn public_body_base64(&self) -> Result<String> {
        let pem = fs::read_to_string(&self.cert_path)?;
        Ok(pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect())
    }
}

/// Decoder over the openssl crate, using the transport key pair on disk.
pub struct OpensslCertificateDecoder {
    transport: TransportCertificate,
}

impl OpensslCertificateDecoder {
    pub fn new(lib_dir: &Path) -> Self {
        OpensslCertificateDecoder {
            transport: TransportCertificate::in_dir(lib_dir),
        }
    }
}

impl CertificateDecoder for OpensslCertificateDecoder {
    fn decrypt_bundle(&self, bundle: &[u8]) -> Result<String> {
        let cert_pem = fs::read(self.transport.cert_path())?;
        let key_pem = fs::read(self.transport.key_path())?;
        let cert = X509::from_pem(&cert_pem).map_err(crypto_err)?;
        let pkey = PKey::private_key_from_pem(&key_pem).map_err(crypto_err)?;

        // The bundle is CMS enveloped data wrapping a passwordless PKCS#12.
        let cms = CmsContentInfo::from_der(bundle).map_err(bundle_err)?;
        let pfx_der = cms.decrypt(&pkey, &cert).map_err(bundle_err)?;
        let parsed = Pkcs12::from_der(&pfx_der)
            .map_err(bundle_err)?
            .parse2("")
            .map_err(bundle_err)?;

        let mut pem = String::new();
        if let Some(pkey) = parsed.pkey {
            let key_pem = pkey.private_key_to_pem_pkcs8().map_err(bundle_err)?;
            pem.push_str(&String::from_utf8_lossy(&key_pem));
        }
        if let Some(cert) = parsed.cert {
            let cert_pem = cert.to_pem().map_err(bundle_err)?;
            pem.push_str(&String::from_utf8_lossy(&cert_pem));
        }
        if let Some(chain) = parsed.ca {
            for cert in chain {
                let cert_pem = cert.to_pem().map_err(bundle_err)?;
                pem.push_str(&String::from_utf8_lossy(&cert_pem));
            }
        }
        Ok(pem)
    }

    fn thumbprint(&self, cert_pem: &str) -> Result<String> {
        let cert = X509::from_pem(cert_pem.as_bytes()).map_err(bundle_err)?;
        let digest = cert.digest(MessageDigest::sha1()).map_err(bundle_err)?;
        Ok(digest.iter().fold(String::new(), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(&mut acc, "{:02X}", b);
            acc
        }))
    }
}

fn crypto_err(e: openssl::error::ErrorStack) -> ProtocolError {
    ProtocolError::Io(std::io::Error::other(e))
}

fn bundle_err(e: openssl::error::ErrorStack) -> ProtocolError {
    ProtocolError::MalformedDocument {
        kind: DocumentKind::Certificates,
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn transport_certificate_round_trip() {
        let dir = tempdir().unwrap();
        let transport = TransportCertificate::in_dir(dir.path());

        transport.ensure().unwrap();
        assert!(transport.cert_path().exists());
        assert!(transport.key_path().exists());

        let body = transport.public_body_base64().unwrap();
        assert!(!body.is_empty());
        assert!(!body.contains("-----"));

        // Idempotent: a second ensure keeps the same certificate.
        let before = fs::read(transport.cert_path()).unwrap();
        transport.ensure().unwrap();
        assert_eq!(fs::read(transport.cert_path()).unwrap(), before);
    }

    #[test]
    fn thumbprint_is_uppercase_sha1_hex() {
        let dir = tempdir().unwrap();
        let transport = TransportCertificate::in_dir(dir.path());
        transport.ensure().unwrap();

        let decoder = OpensslCertificateDecoder::new(dir.path());
        let pem = fs::read_to_string(transport.cert_path()).unwrap();
        let thumbprint = decoder.thumbprint(&pem).unwrap();
        assert_eq!(thumbprint.len(), 40);
        assert!(thumbprint
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn garbage_bundle_is_rejected() {
        let dir = tempdir().unwrap();
        TransportCertificate::in_dir(dir.path()).ensure().unwrap();
        let decoder = OpensslCertificateDecoder::new(dir.path());
        let err = decoder.decrypt_bundle(b"not a cms structure").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedDocument {
                kind: DocumentKind::Certificates,
                ..
            }
        ));
    }
}
