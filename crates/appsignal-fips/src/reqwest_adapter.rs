// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::blocking::ClientBuilder;
use std::error::Error;
#[cfg(feature = "fips")]
use tracing::debug;

/// Creates a blocking reqwest client builder whose only trust anchor is the
/// PEM-encoded root certificate in `ca_pem`.
///
/// The platform trust store is never consulted and peer verification stays on.
#[cfg(not(feature = "fips"))]
pub fn create_reqwest_client_builder(ca_pem: &[u8]) -> Result<ClientBuilder, Box<dyn Error>> {
    let certificate = reqwest::Certificate::from_pem(ca_pem)?;
    Ok(reqwest::blocking::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .add_root_certificate(certificate))
}

/// Creates a blocking reqwest client builder with a FIPS-compliant TLS
/// configuration pinned to the PEM-encoded root certificate in `ca_pem`.
#[cfg(feature = "fips")]
pub fn create_reqwest_client_builder(ca_pem: &[u8]) -> Result<ClientBuilder, Box<dyn Error>> {
    // The provider has to be installed at process start, e.g. with
    // rustls::crypto::default_fips_provider().install_default()
    let provider =
        rustls::crypto::CryptoProvider::get_default().ok_or("No crypto provider configured")?;

    if !provider.fips() {
        return Err("Crypto provider is not FIPS-compliant".into());
    }

    let mut root_cert_store = rustls::RootCertStore::empty();
    let mut valid_count = 0;
    for cert in rustls_pemfile::certs(&mut &ca_pem[..]) {
        match cert.map_err(|err| err.to_string()).and_then(|cert| {
            root_cert_store
                .add(cert)
                .map_err(|err| format!("{err:?}"))
        }) {
            Ok(()) => valid_count += 1,
            Err(err) => {
                debug!("Failed to parse pinned certificate: {}", err);
            }
        }
    }
    if valid_count == 0 {
        return Err("No valid certificate found in pinned root bundle".into());
    }

    let versions = rustls::ALL_VERSIONS.to_vec();
    let config_builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)
        .map_err(|_| "Failed to set protocol versions")?;

    let config = config_builder
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    if !config.fips() {
        return Err("The final TLS configuration is not FIPS-compliant".into());
    }
    debug!("Client builder is configured with FIPS and a pinned root.");

    Ok(reqwest::blocking::Client::builder().use_preconfigured_tls(config))
}

#[cfg(all(test, not(feature = "fips")))]
mod tests {
    use super::*;

    #[test]
    fn builds_client_from_bundled_root() {
        let pem = include_bytes!("../../appsignal-agent/resources/digicert_global_root_g2.pem");
        let builder = create_reqwest_client_builder(pem).expect("pinned root should load");
        assert!(builder.build().is_ok());
    }
}
