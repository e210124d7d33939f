//! Upload client for provisioned Spaces.
//!
//! Posts one media file to a Space's `/separate` endpoint and saves the zip
//! it returns, either inline or through a `download_url` indirection. Space
//! selection round-robins over the registry unless the caller pins one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub input_path: PathBuf,
    pub space_url: String,
    pub token: Option<String>,
    pub out_dir: PathBuf,
    /// Defaults to the input file's stem.
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub id: String,
    pub zip_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub space_url: String,
}

#[derive(Debug, Deserialize)]
struct IndirectResponse {
    download_url: Option<String>,
}

fn separate_endpoint(space_url: &str) -> String {
    format!("{}/separate", space_url.trim_end_matches('/'))
}

pub async fn submit(options: SubmitOptions) -> Result<SubmitOutcome> {
    if !options.input_path.exists() {
        return Err(Error::Client(format!(
            "input file not found: {}",
            options.input_path.display()
        )));
    }
    let space_url = options.space_url.trim_end_matches('/').to_string();
    if space_url.is_empty() {
        return Err(Error::Client("space url required".into()));
    }

    let id = options.job_id.clone().unwrap_or_else(|| {
        options
            .input_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".into())
    });
    std::fs::create_dir_all(&options.out_dir)?;

    let endpoint = separate_endpoint(&space_url);
    info!(target = "spaceup", %endpoint, %id, "submitting job");

    let bytes = tokio::fs::read(&options.input_path).await?;
    let file_name = options
        .input_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.clone());
    let form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

    let client = reqwest::Client::new();
    let mut request = client.post(&endpoint).multipart(form);
    if let Some(token) = &options.token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.bytes().await?;

    if status.is_success() && content_type.contains("application/zip") {
        let zip_path = zip_destination(&options.out_dir, &id);
        std::fs::write(&zip_path, &body)?;
        return Ok(SubmitOutcome { id, zip_path, download_url: None, space_url });
    }

    // Some Spaces answer with a JSON pointer to the artifact instead.
    if let Ok(indirect) = serde_json::from_slice::<IndirectResponse>(&body) {
        if let Some(download_url) = indirect.download_url {
            let artifact = client.get(&download_url).send().await?.bytes().await?;
            let zip_path = zip_destination(&options.out_dir, &id);
            std::fs::write(&zip_path, &artifact)?;
            return Ok(SubmitOutcome {
                id,
                zip_path,
                download_url: Some(download_url),
                space_url,
            });
        }
    }

    Err(Error::Client(format!("Space error: HTTP {status}")))
}

fn zip_destination(out_dir: &Path, id: &str) -> PathBuf {
    out_dir.join(format!("{id}.zip"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slashes() {
        assert_eq!(
            separate_endpoint("https://acme-dsu.hf.space//"),
            "https://acme-dsu.hf.space/separate"
        );
    }

    #[tokio::test]
    async fn missing_input_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = submit(SubmitOptions {
            input_path: dir.path().join("missing.wav"),
            space_url: "https://acme-dsu.hf.space".into(),
            token: None,
            out_dir: dir.path().to_path_buf(),
            job_id: None,
        })
        .await;
        assert!(matches!(outcome, Err(Error::Client(_))));
    }
}
