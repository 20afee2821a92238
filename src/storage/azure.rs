use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Method, Response, StatusCode, Url};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::debug;

use super::connection::{ConnectionString, Credentials};
use super::{BlobStore, StorageError};

const API_VERSION: &str = "2021-06-08";
const BLOB_CONTENT_TYPE: &str = "application/octet-stream";

type HmacSha256 = Hmac<Sha256>;

/// Azure Blob Storage REST client bound to one account.
pub struct AzureBlobStore {
    client: reqwest::Client,
    connection: ConnectionString,
}

impl AzureBlobStore {
    pub fn new(connection: ConnectionString) -> Self {
        Self {
            client: reqwest::Client::new(),
            connection,
        }
    }

    /// URL of a container, or of a blob inside it.
    fn resource_url(&self, container: &str, blob: Option<&str>, query: &[(&str, String)]) -> Url {
        let mut url = self.connection.blob_endpoint.clone();

        let mut path = url.path().trim_end_matches('/').to_string();
        path.push('/');
        path.push_str(&urlencoding::encode(container));
        if let Some(blob) = blob {
            for segment in blob.split('/') {
                path.push('/');
                path.push_str(&urlencoding::encode(segment));
            }
        }
        url.set_path(&path);

        let mut params: Vec<String> = query
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect();
        if let Credentials::Sas(token) = &self.connection.credentials {
            params.push(token.clone());
        }
        let query_string = params.join("&");
        url.set_query((!query_string.is_empty()).then_some(query_string.as_str()));
        url
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        extra_headers: Vec<(String, String)>,
        body: Option<&[u8]>,
    ) -> Result<Response, StorageError> {
        let mut headers = BTreeMap::new();
        headers.insert("x-ms-date".to_string(), http_date(chrono::Utc::now()));
        headers.insert("x-ms-version".to_string(), API_VERSION.to_string());
        for (name, value) in extra_headers {
            headers.insert(name.to_ascii_lowercase(), value);
        }

        let content_length = body.map_or(0, <[u8]>::len);
        let content_type = if body.is_some() { BLOB_CONTENT_TYPE } else { "" };

        let mut request = self.client.request(method.clone(), url.clone());
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Credentials::SharedKey(key) = &self.connection.credentials {
            let to_sign = string_to_sign(
                &method,
                &url,
                &self.connection.account_name,
                &headers,
                content_length,
                content_type,
            );
            let signature = sign(key, &to_sign)?;
            request = request.header(
                "Authorization",
                format!("SharedKey {}:{}", self.connection.account_name, signature),
            );
        }

        request = match body {
            Some(body) => request
                .header("Content-Type", content_type)
                .body(body.to_vec()),
            None if method == Method::PUT => request.body(Vec::new()),
            None => request,
        };

        Ok(request.send().await?)
    }
}

fn http_date(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Shared Key string-to-sign for the blob service.
fn string_to_sign(
    method: &Method,
    url: &Url,
    account_name: &str,
    headers: &BTreeMap<String, String>,
    content_length: usize,
    content_type: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let canonical_headers: String = headers
        .iter()
        .filter(|(name, _)| name.starts_with("x-ms-"))
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();

    let mut canonical_resource = format!("/{}{}", account_name, url.path());
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        canonical_resource.push_str(&format!("\n{}:{}", name, values.join(",")));
    }

    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range
    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        method.as_str(),
        length,
        content_type,
        canonical_headers,
        canonical_resource
    )
}

fn sign(account_key: &str, string_to_sign: &str) -> Result<String, StorageError> {
    let key = general_purpose::STANDARD
        .decode(account_key)
        .map_err(|e| StorageError::InvalidAccountKey(e.to_string()))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| StorageError::InvalidAccountKey(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn service_error(operation: &'static str, response: &Response) -> StorageError {
    let status = response.status();
    let code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    StorageError::Service {
        operation,
        status: status.as_u16(),
        code,
    }
}

fn expect_status(
    operation: &'static str,
    response: Response,
    expected: StatusCode,
) -> Result<Response, StorageError> {
    if response.status() == expected {
        Ok(response)
    } else {
        Err(service_error(operation, &response))
    }
}

fn extract_xml_tag(xml: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);
    let start = xml.find(&start_tag)? + start_tag.len();
    let end = start + xml[start..].find(&end_tag)?;
    Some(unescape_xml(&xml[start..end]))
}

/// Blob names from a List Blobs response body.
fn parse_blob_names(xml: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<Blob>") {
        rest = &rest[start + "<Blob>".len()..];
        let end = rest.find("</Blob>").unwrap_or(rest.len());
        if let Some(name) = extract_xml_tag(&rest[..end], "Name") {
            names.push(name);
        }
        rest = &rest[end..];
    }
    names
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError> {
        let url = self.resource_url(container, None, &[("restype", "container".to_string())]);
        let response = self.send(Method::GET, url, Vec::new(), None).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(service_error("get container properties", &response)),
        }
    }

    async fn create_container(&self, container: &str) -> Result<bool, StorageError> {
        let url = self.resource_url(container, None, &[("restype", "container".to_string())]);
        let response = self.send(Method::PUT, url, Vec::new(), None).await?;
        match response.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::CONFLICT => match service_error("create container", &response) {
                StorageError::Service { code, .. } if code == "ContainerAlreadyExists" => Ok(false),
                err => Err(err),
            },
            _ => Err(service_error("create container", &response)),
        }
    }

    async fn set_container_metadata(
        &self,
        container: &str,
        metadata: &[(String, String)],
    ) -> Result<(), StorageError> {
        let url = self.resource_url(
            container,
            None,
            &[
                ("restype", "container".to_string()),
                ("comp", "metadata".to_string()),
            ],
        );
        let headers = metadata
            .iter()
            .map(|(key, value)| (format!("x-ms-meta-{}", key), value.clone()))
            .collect();
        let response = self.send(Method::PUT, url, headers, None).await?;
        expect_status("set container metadata", response, StatusCode::OK)?;
        Ok(())
    }

    async fn upload_blob(
        &self,
        container: &str,
        blob: &str,
        content: &[u8],
    ) -> Result<(), StorageError> {
        let url = self.resource_url(container, Some(blob), &[]);
        let headers = vec![("x-ms-blob-type".to_string(), "BlockBlob".to_string())];
        let response = self.send(Method::PUT, url, headers, Some(content)).await?;
        expect_status("put blob", response, StatusCode::CREATED)?;
        debug!(container, blob, bytes = content.len(), "uploaded blob");
        Ok(())
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), StorageError> {
        let url = self.resource_url(container, Some(blob), &[]);
        let response = self.send(Method::DELETE, url, Vec::new(), None).await?;
        expect_status("delete blob", response, StatusCode::ACCEPTED)?;
        debug!(container, blob, "deleted blob");
        Ok(())
    }

    async fn list_blobs(
        &self,
        container: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, StorageError> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = vec![
                ("restype", "container".to_string()),
                ("comp", "list".to_string()),
            ];
            if let Some(limit) = limit {
                query.push(("maxresults", (limit - names.len()).to_string()));
            }
            if let Some(marker) = &marker {
                query.push(("marker", marker.clone()));
            }

            let url = self.resource_url(container, None, &query);
            let response = self.send(Method::GET, url, Vec::new(), None).await?;
            let body = expect_status("list blobs", response, StatusCode::OK)?
                .text()
                .await?;

            names.extend(parse_blob_names(&body));
            marker = extract_xml_tag(&body, "NextMarker").filter(|m| !m.is_empty());
            if marker.is_none() || limit.is_some_and(|limit| names.len() >= limit) {
                break;
            }
        }

        if let Some(limit) = limit {
            names.truncate(limit);
        }
        Ok(names)
    }

    async fn delete_container(&self, container: &str) -> Result<(), StorageError> {
        let url = self.resource_url(container, None, &[("restype", "container".to_string())]);
        let response = self.send(Method::DELETE, url, Vec::new(), None).await?;
        expect_status("delete container", response, StatusCode::ACCEPTED)?;
        debug!(container, "deleted container");
        Ok(())
    }
}
