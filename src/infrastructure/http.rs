//! HTTP adapter for the invoicing REST API.

use crate::config::ApiConfig;
use crate::domain::invoice::{
    CreateInvoiceRequest, FelInvoice, FelSubmission, PaymentRequest, ReceiptDocument,
    ReceiptRequest, StatusResponse,
};
use crate::domain::ports::{FelGateway, TokenStoreRef};
use crate::error::{FelError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// [`FelGateway`] over `reqwest`, authenticated with the bearer token from a [`TokenStoreRef`].
#[derive(Clone)]
pub struct HttpFelGateway {
    client: Client,
    base_url: Url,
    tokens: TokenStoreRef,
}

#[derive(Serialize)]
struct RetryBody {
    force: bool,
}

impl HttpFelGateway {
    pub fn new(config: &ApiConfig, tokens: TokenStoreRef) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FelError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            tokens,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.get() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(FelError::Remote {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| format!("HTTP {status}")),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| FelError::Decode(e.to_string()))
    }
}

/// Pulls a human readable message out of an API error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_message", "detail", "error", "message"]
        .iter()
        .find_map(|key| value.get(*key)?.as_str().map(str::to_owned))
}

/// File name from a `Content-Disposition` header, e.g. `attachment; filename="r-1.pdf"`.
fn disposition_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']))
}

#[async_trait]
impl FelGateway for HttpFelGateway {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
        certifier: &str,
    ) -> Result<FelSubmission> {
        let url = self.endpoint("invoices/fel/")?;
        debug!(%url, order_id = request.order_id, certifier, "POST create invoice");
        self.send_json(
            self.client
                .post(url)
                .query(&[("certifier", certifier)])
                .json(request),
        )
        .await
    }

    async fn retry_invoice(&self, invoice_id: i64, force: bool) -> Result<FelSubmission> {
        let url = self.endpoint(&format!("invoices/{invoice_id}/fel/retry/"))?;
        debug!(%url, force, "POST retry invoice");
        self.send_json(self.client.post(url).json(&RetryBody { force }))
            .await
    }

    async fn check_status(&self, invoice_id: i64) -> Result<StatusResponse> {
        let url = self.endpoint(&format!("invoices/{invoice_id}/fel/status/"))?;
        self.send_json(self.client.get(url)).await
    }

    async fn create_receipt(&self, request: &ReceiptRequest) -> Result<ReceiptDocument> {
        let url = self.endpoint("invoices/receipt/")?;
        debug!(%url, order_id = request.order_id, "POST create receipt");
        let response = self.send(self.client.post(url).json(request)).await?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/pdf")
            .to_string();
        let file_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_file_name)
            .unwrap_or_else(|| format!("receipt-{}.pdf", request.order_id));
        let bytes = response.bytes().await?.to_vec();

        Ok(ReceiptDocument {
            file_name,
            content_type,
            bytes,
        })
    }

    async fn record_payment(&self, request: &PaymentRequest) -> Result<FelInvoice> {
        let url = self.endpoint(&format!("invoices/{}/payments/", request.invoice_id))?;
        debug!(%url, amount = %request.amount, "POST record payment");
        self.send_json(self.client.post(url).json(request)).await
    }

    async fn fetch_invoice(&self, invoice_id: i64) -> Result<FelInvoice> {
        let url = self.endpoint(&format!("invoices/{invoice_id}/"))?;
        self.send_json(self.client.get(url)).await
    }
}
