use std::sync::Arc;

use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use chrono::{Local, Utc};
use serde::Deserialize;

use crate::alarm::{AlarmAction, AlarmManager};
use crate::auth::authenticate;
use crate::balance::compute_summary;
use crate::bills;
use crate::documents::{self, DocumentMeta, DocumentUpload};
use crate::error::ApiError;
use crate::notify::Inbox;
use crate::payments::{PaymentRequest, PaymentSimulator};
use crate::schemas::{
    new_id, Bill, BillDraft, Budget, BudgetDraft, Note, NoteDraft, StoredDocument, Transaction,
    TransactionDraft, UserId,
};
use crate::sync::DataContext;

pub struct AppState {
    pub ctx: DataContext,
    pub alarms: Arc<AlarmManager>,
    pub payments: PaymentSimulator,
    pub inbox: Arc<Inbox>,
    pub secret: String,
    pub max_document_bytes: usize,
}

type Data = web::Data<AppState>;

fn user(request: &HttpRequest, state: &AppState) -> Result<UserId, ApiError> {
    authenticate(request, &state.secret).ok_or(ApiError::Unauthorized)
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError::NotFound(format!("Couldn't find {what} {id}"))
}

#[get("/health")]
async fn health(state: Data) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "backend": state.ctx.store().backend_name(),
    }))
}

#[get("/transactions")]
async fn list_transactions(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let data = state.ctx.snapshot(&user_id).await?;
    Ok(HttpResponse::Ok().json(data.transactions))
}

#[post("/transactions")]
async fn add_transaction(
    state: Data,
    request: HttpRequest,
    json: web::Json<TransactionDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let transaction = json.into_inner().into_record(new_id(), user_id.clone());
    let transaction = state.ctx.add(&user_id, transaction).await?;
    Ok(HttpResponse::Accepted().json(transaction))
}

#[put("/transactions/{id}")]
async fn update_transaction(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<TransactionDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let transaction = json.into_inner().into_record(id.into_inner(), user_id.clone());
    let transaction = state.ctx.update(&user_id, transaction).await?;
    Ok(HttpResponse::Accepted().json(transaction))
}

#[delete("/transactions/{id}")]
async fn remove_transaction(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    state.ctx.remove::<Transaction>(&user_id, &id).await?;
    Ok(HttpResponse::Accepted().finish())
}

#[get("/budgets")]
async fn list_budgets(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let data = state.ctx.snapshot(&user_id).await?;
    Ok(HttpResponse::Ok().json(data.budgets))
}

#[post("/budgets")]
async fn add_budget(
    state: Data,
    request: HttpRequest,
    json: web::Json<BudgetDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let budget = json.into_inner().into_record(new_id(), user_id.clone());
    let budget = state.ctx.add(&user_id, budget).await?;
    Ok(HttpResponse::Accepted().json(budget))
}

#[put("/budgets/{id}")]
async fn update_budget(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<BudgetDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let budget = json.into_inner().into_record(id.into_inner(), user_id.clone());
    let budget = state.ctx.update(&user_id, budget).await?;
    Ok(HttpResponse::Accepted().json(budget))
}

#[delete("/budgets/{id}")]
async fn remove_budget(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    state.ctx.remove::<Budget>(&user_id, &id).await?;
    Ok(HttpResponse::Accepted().finish())
}

#[get("/bills")]
async fn list_bills(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let data = state.ctx.snapshot(&user_id).await?;
    Ok(HttpResponse::Ok().json(data.bills))
}

#[derive(Deserialize)]
struct UpcomingQuery {
    days: Option<i64>,
}

#[get("/bills/upcoming")]
async fn upcoming_bills(
    state: Data,
    request: HttpRequest,
    query: web::Query<UpcomingQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let data = state.ctx.snapshot(&user_id).await?;
    let days = query.days.unwrap_or(7).max(0);
    Ok(HttpResponse::Ok().json(bills::upcoming(
        &data.bills,
        Local::now().naive_local(),
        days,
    )))
}

#[post("/bills")]
async fn add_bill(
    state: Data,
    request: HttpRequest,
    json: web::Json<BillDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let bill = json.into_inner().into_record(new_id(), user_id.clone());
    bills::validate(&bill)?;
    let bill = state.ctx.add(&user_id, bill).await?;
    Ok(HttpResponse::Accepted().json(bill))
}

#[put("/bills/{id}")]
async fn update_bill(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<BillDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let bill = json.into_inner().into_record(id.into_inner(), user_id.clone());
    bills::validate(&bill)?;
    let bill = state.ctx.update(&user_id, bill).await?;
    Ok(HttpResponse::Accepted().json(bill))
}

#[post("/bills/{id}/pay")]
async fn pay_bill(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let mut bill = state
        .ctx
        .get::<Bill>(&user_id, &id)
        .await?
        .ok_or_else(|| not_found("bill", &id))?;
    bill.is_paid = true;
    let bill = state.ctx.update(&user_id, bill).await?;
    Ok(HttpResponse::Accepted().json(bill))
}

#[delete("/bills/{id}")]
async fn remove_bill(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    state.ctx.remove::<Bill>(&user_id, &id).await?;
    Ok(HttpResponse::Accepted().finish())
}

#[get("/alarms/current")]
async fn current_alarm(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    match state
        .alarms
        .current(&user_id, Local::now().naive_local())
        .await?
    {
        Some(alarm) => Ok(HttpResponse::Ok().json(alarm)),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

#[derive(Deserialize)]
struct AckJson {
    action: AlarmAction,
}

#[post("/alarms/{bill_id}/ack")]
async fn acknowledge_alarm(
    state: Data,
    request: HttpRequest,
    bill_id: web::Path<String>,
    json: web::Json<AckJson>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    match state
        .alarms
        .acknowledge(&user_id, &bill_id, json.action)
        .await?
    {
        Some(next) => Ok(HttpResponse::Ok().json(next)),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

#[get("/notes")]
async fn list_notes(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let data = state.ctx.snapshot(&user_id).await?;
    Ok(HttpResponse::Ok().json(data.notes))
}

#[post("/notes")]
async fn add_note(
    state: Data,
    request: HttpRequest,
    json: web::Json<NoteDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let note = json
        .into_inner()
        .into_record(new_id(), user_id.clone(), Utc::now().to_rfc3339());
    let note = state.ctx.add(&user_id, note).await?;
    Ok(HttpResponse::Accepted().json(note))
}

#[put("/notes/{id}")]
async fn update_note(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<NoteDraft>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let id = id.into_inner();
    let created_at = state
        .ctx
        .get::<Note>(&user_id, &id)
        .await?
        .map(|note| note.created_at)
        .unwrap_or_else(|| Utc::now().to_rfc3339());
    let note = json.into_inner().into_record(id, user_id.clone(), created_at);
    let note = state.ctx.update(&user_id, note).await?;
    Ok(HttpResponse::Accepted().json(note))
}

#[delete("/notes/{id}")]
async fn remove_note(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    state.ctx.remove::<Note>(&user_id, &id).await?;
    Ok(HttpResponse::Accepted().finish())
}

#[get("/documents")]
async fn list_documents(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let data = state.ctx.snapshot(&user_id).await?;
    let documents = data
        .documents
        .iter()
        .map(DocumentMeta::from)
        .collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(documents))
}

#[post("/documents")]
async fn upload_document(
    state: Data,
    request: HttpRequest,
    json: web::Json<DocumentUpload>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let document =
        documents::accept_upload(json.into_inner(), user_id.clone(), state.max_document_bytes)?;
    let document = state.ctx.add(&user_id, document).await?;
    Ok(HttpResponse::Accepted().json(DocumentMeta::from(&document)))
}

#[get("/documents/{id}")]
async fn download_document(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let document = state
        .ctx
        .get::<StoredDocument>(&user_id, &id)
        .await?
        .ok_or_else(|| not_found("document", &id))?;
    Ok(HttpResponse::Ok()
        .content_type(document.content_type.as_str())
        .body(documents::contents(&document)?))
}

#[delete("/documents/{id}")]
async fn remove_document(
    state: Data,
    request: HttpRequest,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    state.ctx.remove::<StoredDocument>(&user_id, &id).await?;
    Ok(HttpResponse::Accepted().finish())
}

#[post("/payments")]
async fn make_payment(
    state: Data,
    request: HttpRequest,
    json: web::Json<PaymentRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let payment = state
        .payments
        .pay(&state.ctx, &user_id, json.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(payment))
}

#[get("/payments")]
async fn list_payments(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    Ok(HttpResponse::Ok().json(state.payments.history(&user_id).await))
}

#[derive(Deserialize)]
struct SummaryQuery {
    month: Option<String>,
}

#[get("/summary")]
async fn summary(
    state: Data,
    request: HttpRequest,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    let data = state.ctx.snapshot(&user_id).await?;
    Ok(HttpResponse::Ok().json(compute_summary(
        &data.transactions,
        &data.budgets,
        query.month.as_deref(),
    )))
}

#[get("/notifications")]
async fn notifications(state: Data, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user_id = user(&request, &state)?;
    Ok(HttpResponse::Ok().json(state.inbox.drain(&user_id).await))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_transactions)
        .service(add_transaction)
        .service(update_transaction)
        .service(remove_transaction)
        .service(list_budgets)
        .service(add_budget)
        .service(update_budget)
        .service(remove_budget)
        .service(upcoming_bills)
        .service(list_bills)
        .service(add_bill)
        .service(update_bill)
        .service(pay_bill)
        .service(remove_bill)
        .service(current_alarm)
        .service(acknowledge_alarm)
        .service(list_notes)
        .service(add_note)
        .service(update_note)
        .service(remove_note)
        .service(list_documents)
        .service(upload_document)
        .service(download_document)
        .service(remove_document)
        .service(make_payment)
        .service(list_payments)
        .service(summary)
        .service(notifications);
}
