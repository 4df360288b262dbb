//! Self-signed TLS certificates generated in memory

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SerialNumber, SignatureAlgorithm,
};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use tracing::{debug, info};
use validator::Validate;

use crate::config::ParameterSource;
use crate::domain::orchestrator::OrchestratorClient;
use crate::domain::{
    BackendConnector, Credential, CredentialBackend, CredentialId, CredentialPayload, DomainError,
    OutputParameter, PayloadSchema, TaskContext, ValueKind,
};

const BACKEND: &str = "certificate";
const RSA_KEY_BITS: usize = 2048;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyAlgorithm {
    #[default]
    Rsa,
    Ecdsa,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureHash {
    #[default]
    Sha256,
    Sha512,
}

fn default_expiration_days() -> u32 {
    90
}

/// `SM_<NAME>_VALUE` inputs of the certificate provider
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CertificateParameters {
    #[serde(rename = "common_name_value")]
    #[validate(length(min = 1))]
    pub common_name: String,
    #[serde(rename = "org_value", default)]
    pub organization: String,
    #[serde(rename = "country_value", default)]
    pub country: String,
    #[serde(rename = "expiration_days_value", default = "default_expiration_days")]
    #[validate(range(min = 1))]
    pub expiration_days: u32,
    /// Comma separated DNS names
    #[serde(rename = "san_value", default)]
    pub san: String,
    #[serde(rename = "key_algo_value", default)]
    pub key_algorithm: KeyAlgorithm,
    #[serde(rename = "sign_algo_value", default)]
    pub signature_hash: SignatureHash,
}

impl CertificateParameters {
    fn subject_alt_names(&self) -> Vec<String> {
        self.san
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// ECDSA with SHA512 uses P-384 with SHA384; rcgen has no P-256 with SHA512
    fn signature_algorithm(&self) -> &'static SignatureAlgorithm {
        match (self.key_algorithm, self.signature_hash) {
            (KeyAlgorithm::Rsa, SignatureHash::Sha256) => &rcgen::PKCS_RSA_SHA256,
            (KeyAlgorithm::Rsa, SignatureHash::Sha512) => &rcgen::PKCS_RSA_SHA512,
            (KeyAlgorithm::Ecdsa, SignatureHash::Sha256) => &rcgen::PKCS_ECDSA_P256_SHA256,
            (KeyAlgorithm::Ecdsa, SignatureHash::Sha512) => &rcgen::PKCS_ECDSA_P384_SHA384,
        }
    }
}

fn generation_error(context: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::internal(format!("{}: {}", context, err))
}

/// Private key plus its PEM encoding
struct GeneratedKey {
    key_pair: KeyPair,
    pem: String,
}

fn generate_key(params: &CertificateParameters) -> Result<GeneratedKey, DomainError> {
    let algorithm = params.signature_algorithm();

    match params.key_algorithm {
        KeyAlgorithm::Rsa => {
            let key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
                .map_err(|e| generation_error("cannot generate RSA private key", e))?;
            let pkcs8 = key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| generation_error("cannot encode RSA private key", e))?;
            let pkcs1 = key
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| generation_error("cannot encode RSA private key", e))?;
            let key_pair = KeyPair::from_pem_and_sign_algo(&pkcs8, algorithm)
                .map_err(|e| generation_error("cannot load RSA private key", e))?;

            Ok(GeneratedKey {
                key_pair,
                pem: pkcs1.as_str().to_string(),
            })
        }
        KeyAlgorithm::Ecdsa => {
            let (pkcs8, sec1) = match params.signature_hash {
                SignatureHash::Sha256 => {
                    let key = p256::SecretKey::random(&mut OsRng);
                    (key.to_pkcs8_pem(LineEnding::LF), key.to_sec1_pem(LineEnding::LF))
                }
                SignatureHash::Sha512 => {
                    let key = p384::SecretKey::random(&mut OsRng);
                    (key.to_pkcs8_pem(LineEnding::LF), key.to_sec1_pem(LineEnding::LF))
                }
            };
            let pkcs8 = pkcs8.map_err(|e| generation_error("cannot encode ECDSA private key", e))?;
            let sec1 = sec1.map_err(|e| generation_error("cannot encode ECDSA private key", e))?;
            let key_pair = KeyPair::from_pem_and_sign_algo(&pkcs8, algorithm)
                .map_err(|e| generation_error("cannot load ECDSA private key", e))?;

            Ok(GeneratedKey {
                key_pair,
                pem: sec1.as_str().to_string(),
            })
        }
    }
}

/// Random positive 128-bit serial number
fn generate_serial() -> [u8; 16] {
    let mut serial = [0u8; 16];
    OsRng.fill_bytes(&mut serial);
    serial[0] &= 0x7f;
    serial
}

/// Generates certificates. Nothing is stored, so revoking is a no-op.
#[derive(Debug)]
pub struct CertificateBackend {
    params: CertificateParameters,
}

impl CertificateBackend {
    pub fn new(params: CertificateParameters) -> Self {
        Self { params }
    }
}

#[async_trait]
impl CredentialBackend for CertificateBackend {
    async fn create(&self, _task: &TaskContext) -> Result<Credential, DomainError> {
        let serial = generate_serial();
        let serial_number = u128::from_be_bytes(serial).to_string();

        let mut params = CertificateParams::new(self.params.subject_alt_names())
            .map_err(|e| generation_error("invalid subject alternative name", e))?;

        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, self.params.common_name.as_str());
        if !self.params.organization.is_empty() {
            subject.push(DnType::OrganizationName, self.params.organization.as_str());
        }
        if !self.params.country.is_empty() {
            subject.push(DnType::CountryName, self.params.country.as_str());
        }
        params.distinguished_name = subject;
        params.serial_number = Some(SerialNumber::from_slice(&serial));
        params.not_before = time::OffsetDateTime::now_utc();
        params.not_after =
            params.not_before + time::Duration::days(i64::from(self.params.expiration_days));
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let key = generate_key(&self.params)?;
        let certificate = params.self_signed(&key.key_pair).map_err(|e| {
            generation_error(
                &format!("cannot create certificate with serial number: '{}'", serial_number),
                e,
            )
        })?;

        info!(
            credentials_id = %serial_number,
            common_name = %self.params.common_name,
            "Certificate generated"
        );

        Ok(Credential::new(
            CredentialId::new(serial_number),
            CredentialPayload::new()
                .with_string("private_key_base64", BASE64.encode(key.pem))
                .with_string("certificate_base64", BASE64.encode(certificate.pem())),
        ))
    }

    async fn revoke(&self, credential_id: &CredentialId) -> Result<(), DomainError> {
        debug!(credentials_id = %credential_id, "Certificates are not stored, nothing to revoke");
        Ok(())
    }

    fn output_schema(&self) -> PayloadSchema {
        PayloadSchema::new(vec![
            OutputParameter::required("private_key_base64", ValueKind::String),
            OutputParameter::required("certificate_base64", ValueKind::String),
        ])
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

#[derive(Debug)]
pub struct CertificateConnector {
    parameters: ParameterSource,
}

impl CertificateConnector {
    pub fn new(parameters: ParameterSource) -> Self {
        Self { parameters }
    }
}

#[async_trait]
impl BackendConnector for CertificateConnector {
    async fn connect(
        &self,
        _orchestrator: &dyn OrchestratorClient,
        _task: &TaskContext,
    ) -> Result<Box<dyn CredentialBackend>, DomainError> {
        let params: CertificateParameters = self.parameters.load()?;
        Ok(Box::new(CertificateBackend::new(params)))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
