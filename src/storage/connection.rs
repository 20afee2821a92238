use reqwest::Url;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::StorageError;

const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// How requests to the account are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Base64 account key used for Shared Key signing.
    SharedKey(String),
    /// SAS token appended to every request's query string.
    Sas(String),
}

/// A parsed Azure Storage connection string, reduced to what the blob
/// service needs.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub account_name: String,
    pub credentials: Credentials,
    /// Blob service root, e.g. `https://acct.blob.core.windows.net`.
    pub blob_endpoint: Url,
}

impl FromStr for ConnectionString {
    type Err = StorageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StorageError::InvalidConnectionString(reason.to_string());

        let mut settings: HashMap<String, String> = HashMap::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid("expected Key=Value pairs separated by ';'"))?;
            settings.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if settings
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(Self {
                account_name: DEV_ACCOUNT_NAME.to_string(),
                credentials: Credentials::SharedKey(DEV_ACCOUNT_KEY.to_string()),
                blob_endpoint: Url::parse(DEV_BLOB_ENDPOINT)
                    .map_err(|_| invalid("invalid development storage endpoint"))?,
            });
        }

        let credentials = match (
            settings.get("accountkey"),
            settings.get("sharedaccesssignature"),
        ) {
            (Some(key), _) => Credentials::SharedKey(key.clone()),
            (None, Some(sas)) => Credentials::Sas(sas.trim_start_matches('?').to_string()),
            (None, None) => return Err(invalid("missing AccountKey or SharedAccessSignature")),
        };

        let blob_endpoint = match settings.get("blobendpoint") {
            Some(endpoint) => {
                Url::parse(endpoint).map_err(|_| invalid("BlobEndpoint is not a valid URL"))?
            }
            None => {
                let account = settings
                    .get("accountname")
                    .ok_or_else(|| invalid("missing AccountName"))?;
                let protocol = settings
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = settings
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                Url::parse(&format!("{}://{}.blob.{}", protocol, account, suffix))
                    .map_err(|_| invalid("cannot build blob endpoint from AccountName"))?
            }
        };

        let account_name = match settings.get("accountname") {
            Some(name) => name.clone(),
            None => blob_endpoint
                .host_str()
                .and_then(|host| host.split('.').next())
                .map(str::to_string)
                .ok_or_else(|| invalid("missing AccountName"))?,
        };

        if matches!(credentials, Credentials::SharedKey(_))
            && settings.get("accountname").is_none()
        {
            return Err(invalid("AccountKey requires AccountName"));
        }

        Ok(Self {
            account_name,
            credentials,
            blob_endpoint,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::SharedKey(_) => f.write_str("SharedKey(<redacted>)"),
            Credentials::Sas(_) => f.write_str("Sas(<redacted>)"),
        }
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("credentials", &self.credentials)
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish()
    }
}
