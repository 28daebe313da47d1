use async_trait::async_trait;
use libcat_core::{Book, EntityKind, NamedEntity};
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{ApiError, BorrowRequest, LibraryApi, Record, Result, ReturnRequest};

/// reqwest-backed [`LibraryApi`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescriptionBody {
    description: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized).map_err(|err| ApiError::InvalidUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|err| ApiError::InvalidUrl {
            url: format!("{}{path}", self.base),
            reason: err.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, ?query, "GET");
        let response = self.http.get(url).query(query).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post(&self, path: &str, body: Option<&impl serde::Serialize>) -> Result<Response> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        let request = self.http.post(url);
        let request = match body {
            Some(body) => request.json(body),
            None => {
                request.header(reqwest::header::CONTENT_TYPE, "application/json; charset=UTF-8")
            }
        };
        check_status(request.send().await?).await
    }
}

/// Maps a non-success response to [`ApiError::Status`], keeping the
/// backend's `{"error": ...}` message when the body has one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
        .and_then(|body| body.error);
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl LibraryApi for ApiClient {
    async fn list_books(&self) -> Result<Vec<Book>> {
        self.get_json(&EntityKind::Books.endpoint(), &[]).await
    }

    async fn list_named(&self, kind: EntityKind) -> Result<Vec<NamedEntity>> {
        self.get_json(&kind.endpoint(), &[]).await
    }

    async fn fetch_records(&self, kind: EntityKind, id: &str) -> Result<Vec<Record>> {
        self.get_json(&kind.endpoint(), &[("id", id)]).await
    }

    async fn borrow(&self, request: &BorrowRequest) -> Result<()> {
        self.post("api/borrow", Some(request)).await?;
        Ok(())
    }

    async fn return_book(&self, request: &ReturnRequest) -> Result<()> {
        self.post("api/return", Some(request)).await?;
        Ok(())
    }

    async fn remove_borrowers(&self) -> Result<()> {
        self.post("api/removeBorrowers", None::<&()>).await?;
        Ok(())
    }

    async fn describe(&self, kind: EntityKind, name: &str) -> Result<Option<String>> {
        let body: DescriptionBody = self
            .get_json(
                "api/description",
                &[("type", kind.description_label()), ("name", name)],
            )
            .await?;
        Ok(body.description.filter(|text| !text.is_empty()))
    }
}
