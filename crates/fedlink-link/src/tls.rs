//! TLS connector construction from stored peer credentials.

use crate::error::LinkError;
use fedlink_registry::{PeerCredentials, StoredCertificate};
use fedlink_types::CertFormat;
use native_tls::{Certificate, Identity, TlsConnector};

/// Builds a connector for one peer.
///
/// - A CA certificate (PEM or DER) becomes the only trust anchor.
/// - A PKCS#12 client bundle is opened with the peer password, or an empty
///   one when none is set.
/// - A PEM client certificate is paired with the PEM private key slot.
pub fn build_connector(
    credentials: &PeerCredentials,
    password: Option<&str>,
) -> Result<tokio_native_tls::TlsConnector, LinkError> {
    let mut builder = TlsConnector::builder();

    if let Some(ca) = &credentials.ca {
        builder.add_root_certificate(load_certificate(ca)?);
        builder.disable_built_in_roots(true);
    }

    if let Some(identity) = load_identity(credentials, password)? {
        builder.identity(identity);
    }

    Ok(tokio_native_tls::TlsConnector::from(builder.build()?))
}

fn load_certificate(cert: &StoredCertificate) -> Result<Certificate, LinkError> {
    match cert.format {
        CertFormat::Pem => Ok(Certificate::from_pem(&cert.data)?),
        CertFormat::Der => Ok(Certificate::from_der(&cert.data)?),
        CertFormat::Pkcs12 => Err(LinkError::Credentials(format!(
            "CA slot holds a PKCS#12 bundle ({}); upload the CA as PEM or DER",
            cert.filename
        ))),
    }
}

fn load_identity(
    credentials: &PeerCredentials,
    password: Option<&str>,
) -> Result<Option<Identity>, LinkError> {
    let Some(cert) = &credentials.client_cert else {
        if credentials.client_key.is_some() {
            tracing::warn!("client key uploaded without a client certificate; ignoring it");
        }
        return Ok(None);
    };

    match cert.format {
        CertFormat::Pkcs12 => Ok(Some(Identity::from_pkcs12(
            &cert.data,
            password.unwrap_or(""),
        )?)),
        CertFormat::Pem => {
            let key = credentials.client_key.as_ref().ok_or_else(|| {
                LinkError::Credentials(
                    "client certificate uploaded without a private key".to_string(),
                )
            })?;
            if key.format != CertFormat::Pem {
                return Err(LinkError::Credentials(format!(
                    "private key {} must be PEM (PKCS#8)",
                    key.filename
                )));
            }
            Ok(Some(Identity::from_pkcs8(&cert.data, &key.data)?))
        }
        CertFormat::Der => Err(LinkError::Credentials(format!(
            "client certificate {} is DER; upload it as PEM or as a PKCS#12 bundle",
            cert.filename
        ))),
    }
}
