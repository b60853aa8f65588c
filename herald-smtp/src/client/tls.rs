//! Trust anchors and connector construction for implicit TLS.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use herald_common::tracing;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

use super::error::{ClientError, Result};

/// Build a connector trusting the certificates in the PEM bundle at
/// `ca_cert_store`, or the platform trust store when the path is empty.
///
/// # Errors
///
/// Returns [`ClientError::Certificate`] if the bundle cannot be opened, is
/// malformed, or yields no usable certificate.
pub fn connector(ca_cert_store: &Path) -> Result<TlsConnector> {
    let roots = if ca_cert_store.as_os_str().is_empty() {
        native_roots()?
    } else {
        bundle_roots(ca_cert_store)?
    };

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

fn bundle_roots(path: &Path) -> Result<RootCertStore> {
    let file = File::open(path).map_err(|e| {
        ClientError::Certificate(format!("Unable to open {}: {e}", path.display()))
    })?;

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert.map_err(|e| {
            ClientError::Certificate(format!("Unable to parse {}: {e}", path.display()))
        })?;
        roots
            .add(cert)
            .map_err(|e| ClientError::Certificate(format!("Failed to add certificate: {e}")))?;
    }

    if roots.is_empty() {
        return Err(ClientError::Certificate(format!(
            "No certificates found in {}",
            path.display()
        )));
    }

    Ok(roots)
}

fn native_roots() -> Result<RootCertStore> {
    let certs = rustls_native_certs::load_native_certs();
    if !certs.errors.is_empty() {
        tracing::warn!(errors = ?certs.errors, "Some platform certificates could not be loaded");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.certs);
    tracing::debug!(added, ignored, "Loaded platform trust store");

    if roots.is_empty() {
        return Err(ClientError::Certificate(
            "Platform trust store is empty".to_string(),
        ));
    }

    Ok(roots)
}
