//! HTTP API consumed by the bundled UI shell.
//!
//! Every mutating route locks the shared `Ledger` and runs exactly one
//! ledger operation, so each request is its own transaction.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use ledger_core::{
    BundleEdit, CashFlow, Ledger, LedgerError, LedgerOutcome, LedgerWarning, NewPurchase, NewSale,
    SalePatch,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

pub type AppState = Arc<Mutex<Ledger>>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/vendor-transactions",
            get(list_purchases).post(record_purchase),
        )
        .route("/api/vendor-transactions/:id", delete(delete_purchase))
        .route("/api/subscriptions", get(list_sales).post(create_sale))
        .route(
            "/api/subscriptions/:id",
            get(get_sale).put(update_sale).delete(delete_sale),
        )
        .route(
            "/api/subscriptions/bundle/:bundle_id",
            delete(delete_bundle).put(edit_bundle),
        )
        .route("/api/checkout", post(checkout))
        .route("/api/credit-balances", get(list_balances))
        .route("/api/credit-balances/reconcile", get(reconcile))
        .route("/api/vendors", get(list_vendors).post(create_vendor))
        .route(
            "/api/vendors/:id/services",
            get(list_vendor_services).post(create_vendor_service),
        )
        .route("/api/customers", get(list_customers).post(create_customer))
        .route(
            "/api/business-transactions",
            get(list_cash).post(record_cash),
        )
        .with_state(state)
}

// ── Errors ─────────────────────────────────────────────────────────

/// A ledger error rendered as `{error, code}` with a status per kind.
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::InsufficientCredits { .. } | LedgerError::Consistency { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("request failed: {}", self.0);
        } else {
            log::info!("request rejected: {}", self.0);
        }
        let body = json!({ "error": self.0.to_string(), "code": self.0.code() });
        (status, Json(body)).into_response()
    }
}

/// Malformed bodies and path segments are validation errors like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(LedgerError::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(LedgerError::Validation(rejection.body_text()))
    }
}

/// `Json` whose rejection renders through `ApiError`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

/// `Path` whose rejection renders through `ApiError`.
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
struct ApiPath<T>(T);

type ApiResult = Result<Json<Value>, ApiError>;

fn list<T: serde::Serialize>(rows: Vec<T>) -> ApiResult {
    Ok(Json(serde_json::to_value(rows).map_err(LedgerError::from)?))
}

/// `{success: true, ...extra}` plus `warnings` when the outcome has any.
fn success<T>(outcome: LedgerOutcome<T>, extra: impl FnOnce(T) -> Value) -> ApiResult {
    let mut body = json!({ "success": true });
    if let (Value::Object(map), Value::Object(more)) = (&mut body, extra(outcome.value)) {
        map.extend(more);
    }
    attach_warnings(&mut body, &outcome.warnings);
    Ok(Json(body))
}

fn attach_warnings(body: &mut Value, warnings: &[LedgerWarning]) {
    if warnings.is_empty() {
        return;
    }
    if let Value::Object(map) = body {
        map.insert("warnings".into(), json!(warnings));
    }
}

// ── Request bodies ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PurchaseBody {
    #[serde(rename = "vendorID")]
    vendor_id: i64,
    #[serde(rename = "serviceName")]
    service_name: String,
    credits: i64,
    #[serde(rename = "priceUSD", default)]
    price_usd: f64,
    #[serde(rename = "purchaseDate", default)]
    purchase_date: Option<NaiveDate>,
    #[serde(default)]
    notes: Option<String>,
}

/// One cart line / sale, without the customer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleLine {
    service_name: String,
    #[serde(rename = "vendorID", default)]
    vendor_id: Option<i64>,
    #[serde(default)]
    vendor_service_name: Option<String>,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    expiry_date: Option<NaiveDate>,
    #[serde(default)]
    credits_selected: i64,
    #[serde(default)]
    amount_paid: f64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    order_status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    classification: Option<String>,
    #[serde(rename = "bundleID", default)]
    bundle_id: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl SaleLine {
    fn into_sale(self, customer_id: i64) -> NewSale {
        let mut sale = NewSale::new(
            customer_id,
            self.service_name,
            self.credits_selected,
            self.amount_paid,
        );
        sale.vendor_id = self.vendor_id;
        sale.vendor_service_name = self.vendor_service_name;
        if let Some(start_date) = self.start_date {
            sale.start_date = start_date;
        }
        sale.expiry_date = self.expiry_date;
        if let Some(status) = self.status {
            sale.status = status;
        }
        sale.order_status = self.order_status;
        sale.payment_status = self.payment_status;
        sale.payment_method = self.payment_method;
        sale.classification = self.classification;
        sale.bundle_id = self.bundle_id;
        sale.notes = self.notes;
        sale
    }
}

#[derive(Debug, Deserialize)]
struct SaleBody {
    #[serde(rename = "customerID")]
    customer_id: i64,
    #[serde(flatten)]
    line: SaleLine,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalePatchBody {
    #[serde(default)]
    credits_used: Option<i64>,
    #[serde(default)]
    amount_paid: Option<f64>,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(rename = "vendorID", default)]
    vendor_id: Option<i64>,
    #[serde(default)]
    vendor_service_name: Option<String>,
    #[serde(default)]
    expiry_date: Option<NaiveDate>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    order_status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    classification: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl From<SalePatchBody> for SalePatch {
    fn from(b: SalePatchBody) -> Self {
        SalePatch {
            credits_used: b.credits_used,
            amount_paid: b.amount_paid,
            service_name: b.service_name,
            vendor_id: b.vendor_id,
            vendor_service_name: b.vendor_service_name,
            expiry_date: b.expiry_date,
            status: b.status,
            order_status: b.order_status,
            payment_status: b.payment_status,
            payment_method: b.payment_method,
            classification: b.classification,
            notes: b.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BundleUpdateItem {
    id: i64,
    #[serde(flatten)]
    patch: SalePatchBody,
}

#[derive(Debug, Default, Deserialize)]
struct BundleEditBody {
    #[serde(default)]
    add: Vec<SaleBody>,
    #[serde(default)]
    update: Vec<BundleUpdateItem>,
    #[serde(default)]
    remove: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct CheckoutBody {
    #[serde(rename = "customerID")]
    customer_id: i64,
    #[serde(rename = "bundleID", default)]
    bundle_id: Option<String>,
    items: Vec<SaleLine>,
}

#[derive(Debug, Deserialize)]
struct VendorBody {
    name: String,
    #[serde(default)]
    contact: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VendorServiceBody {
    service_name: String,
    #[serde(default)]
    cost_per_credit: f64,
}

#[derive(Debug, Deserialize)]
struct CustomerBody {
    name: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CashBody {
    kind: CashFlow,
    #[serde(rename = "amountUSD")]
    amount_usd: f64,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "occurredOn", default)]
    occurred_on: Option<NaiveDate>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ── Handlers ───────────────────────────────────────────────────────

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn record_purchase(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PurchaseBody>,
) -> ApiResult {
    let purchase = NewPurchase {
        vendor_id: body.vendor_id,
        service_name: body.service_name,
        credits: body.credits,
        price_usd: body.price_usd,
        purchase_date: body.purchase_date.unwrap_or_else(today),
        notes: body.notes,
    };
    let ledger = state.lock().await;
    let outcome = ledger.record_purchase(&purchase)?;
    success(outcome, |id| json!({ "id": id }))
}

async fn list_purchases(State(state): State<AppState>) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.store().vendor_transactions()?)
}

async fn delete_purchase(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> ApiResult {
    let ledger = state.lock().await;
    let outcome = ledger.delete_purchase(id)?;
    success(outcome, |()| json!({ "message": "Deleted" }))
}

async fn create_sale(State(state): State<AppState>, ApiJson(body): ApiJson<SaleBody>) -> ApiResult {
    let ledger = state.lock().await;
    let outcome = ledger.create_sale(body.line.into_sale(body.customer_id))?;
    success(outcome, |id| json!({ "id": id }))
}

async fn list_sales(State(state): State<AppState>) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.store().subscriptions()?)
}

async fn get_sale(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> ApiResult {
    let ledger = state.lock().await;
    let row = ledger
        .store()
        .subscription(id)?
        .ok_or_else(|| LedgerError::not_found("subscription", id))?;
    Ok(Json(serde_json::to_value(row).map_err(LedgerError::from)?))
}

async fn update_sale(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<SalePatchBody>,
) -> ApiResult {
    let ledger = state.lock().await;
    let outcome = ledger.update_sale(id, body.into())?;
    success(outcome, |()| json!({}))
}

async fn delete_sale(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> ApiResult {
    let ledger = state.lock().await;
    let outcome = ledger.delete_sale(id)?;
    success(outcome, |()| json!({ "message": "Deleted" }))
}

async fn delete_bundle(
    State(state): State<AppState>,
    ApiPath(bundle_id): ApiPath<String>,
) -> ApiResult {
    let ledger = state.lock().await;
    let outcome = ledger.delete_bundle(&bundle_id)?;
    success(outcome, |count| json!({ "message": "Bundle deleted", "deleted": count }))
}

async fn edit_bundle(
    State(state): State<AppState>,
    ApiPath(bundle_id): ApiPath<String>,
    ApiJson(body): ApiJson<BundleEditBody>,
) -> ApiResult {
    let edit = BundleEdit {
        add: body
            .add
            .into_iter()
            .map(|s| s.line.into_sale(s.customer_id))
            .collect(),
        update: body
            .update
            .into_iter()
            .map(|u| (u.id, u.patch.into()))
            .collect(),
        remove: body.remove,
    };
    let ledger = state.lock().await;
    let outcome = ledger.edit_bundle(&bundle_id, edit)?;
    success(outcome, |ids| json!({ "added": ids }))
}

async fn checkout(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CheckoutBody>,
) -> ApiResult {
    let items = body
        .items
        .into_iter()
        .map(|line| line.into_sale(body.customer_id))
        .collect();
    let ledger = state.lock().await;
    let outcome = ledger.checkout(body.customer_id, body.bundle_id, items)?;
    success(outcome, |c| json!({ "bundleID": c.bundle_id, "ids": c.subscription_ids }))
}

async fn list_balances(State(state): State<AppState>) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.store().credit_balances()?)
}

async fn reconcile(State(state): State<AppState>) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.reconcile()?)
}

async fn list_vendors(State(state): State<AppState>) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.store().vendors()?)
}

async fn create_vendor(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<VendorBody>,
) -> ApiResult {
    let ledger = state.lock().await;
    let id = ledger.add_vendor(&body.name, body.contact.as_deref())?;
    Ok(Json(json!({ "success": true, "id": id })))
}

async fn list_vendor_services(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.store().vendor_services(id)?)
}

async fn create_vendor_service(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<VendorServiceBody>,
) -> ApiResult {
    let ledger = state.lock().await;
    let service_id = ledger.add_vendor_service(id, &body.service_name, body.cost_per_credit)?;
    Ok(Json(json!({ "success": true, "id": service_id })))
}

async fn list_customers(State(state): State<AppState>) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.store().customers()?)
}

async fn create_customer(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CustomerBody>,
) -> ApiResult {
    let ledger = state.lock().await;
    let id = ledger.add_customer(&body.name, body.phone.as_deref(), body.email.as_deref())?;
    Ok(Json(json!({ "success": true, "id": id })))
}

async fn list_cash(State(state): State<AppState>) -> ApiResult {
    let ledger = state.lock().await;
    list(ledger.store().business_transactions()?)
}

async fn record_cash(State(state): State<AppState>, ApiJson(body): ApiJson<CashBody>) -> ApiResult {
    let ledger = state.lock().await;
    let id = ledger.record_cash(
        body.kind,
        body.amount_usd,
        body.description.as_deref(),
        body.occurred_on.unwrap_or_else(today),
    )?;
    Ok(Json(json!({ "success": true, "id": id })))
}
