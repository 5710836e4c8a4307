// REST API with Axum
//
// Each route maps to one Store operation. Ledger errors become HTTP statuses
// here and nowhere else.

use axum::{
    async_trait,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::error::LedgerError;
use crate::model::{
    parse_date, Flat, FlatUpdate, Month, NewFlat, NewPayment, Payment, PaymentFilter,
    PaymentRequest, Period,
};
use crate::registry::FlatOrder;
use crate::reports::{
    Dashboard, FlatSummary, GroupStatistics, OutstandingDues, PeriodReport, StatusFilter,
};
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    /// Default fee for the outstanding-dues estimate
    pub expected_fee: f64,
}

impl AppState {
    pub fn new(store: Arc<Store>, expected_fee: f64) -> Self {
        AppState { store, expected_fee }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// A ledger error on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::DuplicateIdentifier(_) | LedgerError::DuplicatePeriod { .. } => {
                StatusCode::CONFLICT
            }
            LedgerError::UnknownFlat(_) | LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::Config(_) | LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: self.0.kind().to_string(),
                message: self.0.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

// Malformed bodies and query strings are validation failures like any other
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(LedgerError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(LedgerError::validation(rejection.body_text()))
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Extractors
// ============================================================================

/// `Json` body whose rejection is answered with the error envelope
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `Query` string whose rejection is answered with the error envelope
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

// ============================================================================
// Query parameters
// ============================================================================

/// Month and status stay strings so a bad value is a ValidationError
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodQuery {
    pub year: Option<i32>,
    pub month: Option<String>,
    pub fee: Option<f64>,
    pub as_of: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
}

impl PeriodQuery {
    fn month(&self) -> Result<Option<Month>, LedgerError> {
        self.month
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(str::parse)
            .transpose()
    }

    fn as_of(&self) -> Result<NaiveDate, LedgerError> {
        match self.as_of.as_deref() {
            Some(date) => parse_date(date),
            None => Ok(Utc::now().date_naive()),
        }
    }

    /// Explicit year/month, falling back to the `as_of` year and, if
    /// `month_required`, its month
    fn period(&self, month_required: bool) -> Result<Period, LedgerError> {
        let as_of = self.as_of()?;
        let year = self.year.unwrap_or_else(|| as_of.year());
        let month = match self.month()? {
            Some(month) => Some(month),
            None if month_required => Some(Month::of(as_of)),
            None => None,
        };
        Ok(Period { year, month })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuery {
    pub flat_number: Option<String>,
    pub month: Option<String>,
    pub year: Option<i32>,
}

impl TryFrom<PaymentQuery> for PaymentFilter {
    type Error = LedgerError;

    fn try_from(q: PaymentQuery) -> Result<Self, LedgerError> {
        Ok(PaymentFilter {
            flat_number: q.flat_number.filter(|f| !f.trim().is_empty()),
            month: q
                .month
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .map(str::parse)
                .transpose()?,
            year: q.year,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedFlatResponse {
    pub flat_number: String,
    pub payments_removed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedResponse {
    pub flats: usize,
    pub payments: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> Json<ApiResponse<&'static str>> {
    ApiResponse::ok("OK")
}

/// GET /api/flats - sorted by flat number
async fn list_flats(State(state): State<AppState>) -> ApiResult<Vec<Flat>> {
    Ok(ApiResponse::ok(state.store.list_flats(FlatOrder::ByIdentifier)?))
}

/// POST /api/flats
async fn register_flat(
    State(state): State<AppState>,
    ApiJson(new_flat): ApiJson<NewFlat>,
) -> Result<(StatusCode, Json<ApiResponse<Flat>>), ApiError> {
    let flat = state.store.register_flat(&new_flat)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(flat)))
}

/// GET /api/flats/:flat_number
async fn get_flat(
    State(state): State<AppState>,
    Path(flat_number): Path<String>,
) -> ApiResult<Flat> {
    Ok(ApiResponse::ok(state.store.find_flat(&flat_number)?))
}

/// PUT /api/flats/:flat_number
async fn update_flat(
    State(state): State<AppState>,
    Path(flat_number): Path<String>,
    ApiJson(update): ApiJson<FlatUpdate>,
) -> ApiResult<Flat> {
    Ok(ApiResponse::ok(state.store.update_flat(&flat_number, &update)?))
}

/// DELETE /api/flats/:flat_number - cascades to the flat's payments
async fn remove_flat(
    State(state): State<AppState>,
    Path(flat_number): Path<String>,
) -> ApiResult<RemovedFlatResponse> {
    let removed = state.store.remove_flat(&flat_number)?;
    Ok(ApiResponse::ok(RemovedFlatResponse {
        flat_number: removed.flat.flat_number,
        payments_removed: removed.payments_removed,
    }))
}

/// GET /api/flats/:flat_number/summary?asOf=
async fn flat_summary(
    State(state): State<AppState>,
    Path(flat_number): Path<String>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<FlatSummary> {
    Ok(ApiResponse::ok(state.store.flat_summary(&flat_number, query.as_of()?)?))
}

/// GET /api/payments?flatNumber=&month=&year=
async fn list_payments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PaymentQuery>,
) -> ApiResult<Vec<Payment>> {
    let filter = PaymentFilter::try_from(query)?;
    Ok(ApiResponse::ok(state.store.list_payments(&filter)?))
}

/// POST /api/payments
async fn record_payment(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Payment>>), ApiError> {
    let new_payment = NewPayment::try_from(request)?;
    let payment = state.store.record_payment(&new_payment)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(payment)))
}

/// GET /api/payments/flat/:flat_number
async fn payments_for_flat(
    State(state): State<AppState>,
    Path(flat_number): Path<String>,
) -> ApiResult<Vec<Payment>> {
    Ok(ApiResponse::ok(state.store.list_for_flat(&flat_number)?))
}

/// DELETE /api/payments/:id
async fn remove_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Payment> {
    Ok(ApiResponse::ok(state.store.remove_payment(&id)?))
}

/// GET /api/groups?month=&year= - defaults to the current month
async fn group_statistics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<Vec<GroupStatistics>> {
    let period = query.period(true)?;
    let month = period.month.unwrap_or_else(|| Month::of(Utc::now().date_naive()));
    Ok(ApiResponse::ok(state.store.group_statistics(month, period.year)?))
}

/// GET /api/reports?year=&month=
async fn period_report(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<PeriodReport> {
    Ok(ApiResponse::ok(state.store.period_report(query.period(false)?)?))
}

/// GET /api/reports/outstanding?year=&month=&fee=&asOf=
async fn outstanding_dues(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<OutstandingDues> {
    let period = query.period(false)?;
    let fee = query.fee.unwrap_or(state.expected_fee);
    Ok(ApiResponse::ok(state.store.outstanding_dues(period, fee, query.as_of()?)?))
}

/// GET /api/dashboard?search=&status=&month=&year=
async fn dashboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<Dashboard> {
    let period = query.period(true)?;
    let month = period.month.unwrap_or_else(|| Month::of(Utc::now().date_naive()));
    let filter: StatusFilter = query.status.as_deref().unwrap_or("all").parse()?;
    let search = query.search.as_deref().unwrap_or("");
    Ok(ApiResponse::ok(state.store.dashboard(search, filter, month, period.year)?))
}

/// POST /api/seed - replace everything with the sample data
async fn seed(State(state): State<AppState>) -> ApiResult<SeedResponse> {
    let summary = state.store.seed_sample_data()?;
    Ok(ApiResponse::ok(SeedResponse {
        flats: summary.flats,
        payments: summary.payments,
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/flats", get(list_flats).post(register_flat))
        .route(
            "/flats/:flat_number",
            get(get_flat).put(update_flat).delete(remove_flat),
        )
        .route("/flats/:flat_number/summary", get(flat_summary))
        .route("/payments", get(list_payments).post(record_payment))
        .route("/payments/flat/:flat_number", get(payments_for_flat))
        .route("/payments/:id", delete(remove_payment))
        .route("/groups", get(group_statistics))
        .route("/reports", get(period_report))
        .route("/reports/outstanding", get(outstanding_dues))
        .route("/dashboard", get(dashboard))
        .route("/seed", post(seed))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
