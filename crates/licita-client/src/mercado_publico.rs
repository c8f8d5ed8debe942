use async_trait::async_trait;
use chrono::NaiveDate;
use licita_core::config::HttpConfig;
use licita_core::dates::{dates_iso, listing_date_param};
use licita_core::error::AppError;
use licita_core::models::{format_amount, FetchOutcome, ListingSummary, Record, STATUS_PUBLISHED};
use licita_core::pacing::PacingState;
use licita_core::retry::{fetch_with_retry, Attempt};
use licita_core::traits::TenderSource;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Maximum number of line items listed in a record's product summary.
const MAX_LISTED_PRODUCTS: usize = 15;

/// Separator between line items in the product summary.
const PRODUCT_SEPARATOR: &str = " || ";

/// Product summary for tenders without line items.
const NO_PRODUCTS: &str = "Ver en Web";

const DEFAULT_CATEGORY: &str = "General";
const DEFAULT_BUYER: &str = "N/A";
const DEFAULT_DESCRIPTION: &str = "Sin descripción";

/// Public detail page of a tender on the registry website.
const DETAIL_PAGE: &str =
    "http://www.mercadopublico.cl/Procurement/Modules/RFB/DetailsAcquisition.aspx";

/// Envelope of both the detail and the listing endpoints.
///
/// ```json
/// { "Cantidad": 1, "FechaCreacion": "...", "Listado": [ ... ] }
/// ```
///
/// A missing or null `Listado` reads as empty.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase", bound(deserialize = "T: Deserialize<'de>"))]
struct ListadoResponse<T> {
    #[serde(default)]
    listado: Option<Vec<T>>,
}

impl<T> ListadoResponse<T> {
    fn into_items(self) -> Vec<T> {
        self.listado.unwrap_or_default()
    }
}

/// Data Transfer Object for one tender from the detail endpoint.
///
/// Only the fields the dataset uses are modelled; `CodigoExterno` and
/// `Nombre` are required, everything else falls back to a default.
///
/// # Examples
///
/// ```
/// use licita_client::mercado_publico::TenderDetail;
///
/// let json = r#"{
///     "CodigoExterno": "1001-2024",
///     "Nombre": "Compra de sillas",
///     "Fechas": {"FechaCierre": "2024-07-01T15:00:00"}
/// }"#;
///
/// let detail: TenderDetail = serde_json::from_str(json).unwrap();
/// assert_eq!(detail.codigo_externo, "1001-2024");
/// assert!(detail.items.is_none());
/// ```
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct TenderDetail {
    pub codigo_externo: String,
    pub nombre: String,
    #[serde(default)]
    pub descripcion: Option<String>,
    /// Number or numeric string, depending on the tender.
    #[serde(default)]
    pub monto_estimado: Option<Value>,
    #[serde(default)]
    pub moneda: Option<String>,
    #[serde(default)]
    pub comprador: Option<Buyer>,
    #[serde(default)]
    pub fechas: Option<TenderDates>,
    #[serde(default)]
    pub items: Option<LineItems>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Buyer {
    #[serde(default)]
    pub nombre_organismo: Option<String>,
    #[serde(default)]
    pub region_unidad: Option<String>,
    #[serde(default)]
    pub mail_usuario: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TenderDates {
    #[serde(default)]
    pub fecha_cierre: Option<String>,
    #[serde(default)]
    pub fecha_publicacion: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct LineItems {
    #[serde(default)]
    pub listado: Option<Vec<LineItem>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    #[serde(default)]
    pub nombre_producto: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub cantidad: Option<Value>,
    #[serde(default)]
    pub rubro: Option<String>,
}

/// HTTP client for the Mercado Publico tender API.
///
/// Certificate verification is disabled: the upstream's chain does not
/// validate reliably, and the data is public.
///
/// # Examples
///
/// ```no_run
/// use licita_client::MercadoPublicoClient;
/// use licita_core::{HttpConfig, PacingState, TenderSource};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = MercadoPublicoClient::new("my-ticket", HttpConfig::default())?;
/// let mut pacing = PacingState::default();
/// let outcome = client.fetch_detail("1001-2024", &mut pacing).await;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MercadoPublicoClient {
    client: Client,
    base_url: Url,
    ticket: String,
    http: HttpConfig,
}

impl MercadoPublicoClient {
    /// Creates a client for the endpoint in `http.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the base URL is malformed.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(ticket: &str, http: HttpConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&http.base_url)
            .map_err(|_| AppError::InvalidUrl(http.base_url.clone()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(http.user_agent.as_str())
            .default_headers(headers)
            .timeout(http.timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            ticket: ticket.to_string(),
            http,
        })
    }

    fn detail_url(&self, code: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("codigo", code)
            .append_pair("ticket", &self.ticket);
        url
    }

    fn listing_url(&self, date: NaiveDate) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("fecha", &listing_date_param(date))
            .append_pair("ticket", &self.ticket);
        url
    }

    /// One detail request, classified for the retry loop.
    async fn attempt_detail(&self, url: &Url, code: &str) -> Attempt {
        let resp = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => return Attempt::Transport(self.transport_error(e)),
        };

        match resp.status() {
            StatusCode::OK => match resp.text().await {
                Ok(body) => match decode_detail(&body, code) {
                    Ok(record) => Attempt::Listing(record),
                    Err(e) => Attempt::Undecodable(e),
                },
                Err(e) => Attempt::Undecodable(self.transport_error(e)),
            },
            StatusCode::TOO_MANY_REQUESTS => Attempt::RateLimited,
            status => Attempt::Status(status.as_u16()),
        }
    }

    /// Maps a reqwest failure, stripping the URL so the ticket never hits the logs.
    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.http.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {}", e.without_url()))
        } else {
            AppError::ClientError(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl TenderSource for MercadoPublicoClient {
    async fn fetch_detail(&self, id: &str, pacing: &mut PacingState) -> FetchOutcome {
        let code = id.trim().to_uppercase();
        let url = self.detail_url(&code);
        let (url, code_ref) = (&url, code.as_str());
        fetch_with_retry(code_ref, &self.http, pacing, move || {
            self.attempt_detail(url, code_ref)
        })
        .await
    }

    /// Fetches the summary listing for one day.
    ///
    /// # Errors
    ///
    /// Any transport error, non-200 status or undecodable body; the caller
    /// skips the day.
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<ListingSummary>, AppError> {
        let resp = self
            .client
            .get(self.listing_url(date))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => return Err(AppError::RateLimitExceeded),
            status => return Err(AppError::HttpStatus(status.as_u16())),
        }

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        let listing = decode_listing(&body)?;
        debug!("{}: {} entries listed", listing_date_param(date), listing.len());
        Ok(listing)
    }
}

/// Decodes a detail response body; `None` when the listing is empty.
pub fn decode_detail(body: &str, requested: &str) -> Result<Option<Record>, AppError> {
    let resp: ListadoResponse<TenderDetail> = serde_json::from_str(body)?;
    Ok(resp
        .into_items()
        .into_iter()
        .next()
        .map(|detail| into_record(detail, requested)))
}

/// Decodes a listing-by-date response body.
pub fn decode_listing(body: &str) -> Result<Vec<ListingSummary>, AppError> {
    let resp: ListadoResponse<ListingSummary> = serde_json::from_str(body)?;
    Ok(resp.into_items())
}

/// Converts an upstream tender into a dataset record.
///
/// `requested` is the cleaned identifier the detail was fetched with; the
/// public link is built from it.
///
/// # Examples
///
/// ```
/// use licita_client::mercado_publico::{into_record, TenderDetail};
///
/// let detail: TenderDetail = serde_json::from_str(r#"{
///     "CodigoExterno": "1001-2024",
///     "Nombre": "Compra de sillas",
///     "Items": {"Listado": [{"NombreProducto": "Widgets", "Cantidad": 10}]}
/// }"#).unwrap();
///
/// let record = into_record(detail, "1001-2024");
/// assert_eq!(record.products, "(10) Widgets");
/// assert_eq!(record.category, "General");
/// assert_eq!(record.estimated_amount, 0.0);
/// ```
pub fn into_record(detail: TenderDetail, requested: &str) -> Record {
    let items = detail
        .items
        .and_then(|i| i.listado)
        .unwrap_or_default();

    let category = items
        .first()
        .and_then(|item| item.rubro.clone())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let products = if items.is_empty() {
        NO_PRODUCTS.to_string()
    } else {
        items
            .iter()
            .take(MAX_LISTED_PRODUCTS)
            .map(product_entry)
            .collect::<Vec<_>>()
            .join(PRODUCT_SEPARATOR)
    };

    let buyer = detail.comprador.unwrap_or_default();
    let dates = detail.fechas.unwrap_or_default();

    Record {
        link: format!("{}?idlicitacion={}", DETAIL_PAGE, requested),
        id: detail.codigo_externo,
        status: STATUS_PUBLISHED.to_string(),
        category,
        title: detail.nombre,
        products,
        estimated_amount: detail.monto_estimado.as_ref().map(number).unwrap_or(0.0),
        currency: detail.moneda.unwrap_or_default(),
        closing_date: dates_iso(dates.fecha_cierre.as_deref()),
        buyer: buyer
            .nombre_organismo
            .unwrap_or_else(|| DEFAULT_BUYER.to_string()),
        region: buyer.region_unidad.unwrap_or_default(),
        contact_email: buyer.mail_usuario.unwrap_or_default(),
        description: detail
            .descripcion
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        published_date: dates_iso(dates.fecha_publicacion.as_deref()),
    }
}

/// `(quantity) name`, the name falling back to the item description.
fn product_entry(item: &LineItem) -> String {
    let name = item
        .nombre_producto
        .as_deref()
        .filter(|n| !n.is_empty())
        .or(item.descripcion.as_deref())
        .unwrap_or_default();
    let quantity = match &item.cantidad {
        Some(Value::String(s)) => s.clone(),
        Some(v) => format_amount(number(v)),
        None => "0".to_string(),
    };
    format!("({}) {}", quantity, name)
}

/// Numeric value of a JSON number or numeric string; anything else is 0.
fn number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
