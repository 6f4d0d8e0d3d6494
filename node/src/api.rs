//! # REST API
//!
//! The axum router that exposes the loan ledger over HTTP. Every handler
//! shares [`AppState`]; the ledger sits behind one `tokio` `RwLock` so
//! writers are serialized and loan ids follow lock order.
//!
//! Amounts travel as decimal strings, addresses as `0x` hex. Writes carry
//! their own authorization: a loan needs the lender's signature over the
//! terms digest, a repayment needs the payer's signature over the repayment
//! digest.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                          |
//! |--------|-----------------------------|--------------------------------------|
//! | GET    | `/health`                   | Liveness check                       |
//! | GET    | `/status`                   | Node and ledger summary              |
//! | POST   | `/terms/hash`               | Canonical digest of loan terms       |
//! | POST   | `/terms/signer`             | Recover the signer of loan terms     |
//! | POST   | `/loans`                    | Create a loan from signed terms      |
//! | GET    | `/loans/:id`                | Loan record                          |
//! | GET    | `/loans/:id/due`            | Outstanding debt                     |
//! | POST   | `/loans/:id/repay`          | Pay toward a loan                    |
//! | POST   | `/loans/:id/repay/digest`   | Digest a payer signs to repay        |
//! | GET    | `/events`                   | Ledger notifications                 |
//! | GET    | `/devnet/assets`            | Fixture asset addresses              |
//! | POST   | `/devnet/tokens/claim`      | Fixture token faucet                 |
//! | POST   | `/devnet/tokens/approve`    | Set a fixture token allowance        |
//! | POST   | `/devnet/nifties/claim`     | Fixture collectible faucet           |
//! | POST   | `/devnet/nifties/approve`   | Approve a fixture collectible        |
//! | GET    | `/devnet/accounts/:address` | Fixture balances and holdings        |

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pawnda_contracts::{
    CollectibleRegistry, FungibleCurrency, FungibleToken, LedgerError, LedgerEvent, Loan, LoanId,
    LoanLedger, LoanStatus, NonFungibleCollateral, StateError,
};
use pawnda_protocol::crypto::{Digest, RecoverableSignature};
use pawnda_protocol::identity::Address;
use pawnda_protocol::terms::{amount_string, hash_repayment, LoanTerms, ValidationError};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    pub ledger: Arc<RwLock<LoanLedger>>,
    /// Present only on networks that deploy the faucet assets.
    pub devnet: Option<DevnetAssets>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Counts a rejected ledger operation and turns it into a response.
    fn reject(&self, err: LedgerError) -> ApiError {
        self.metrics.record_rejection(err.kind());
        ApiError::from(err)
    }

    fn devnet(&self) -> Result<&DevnetAssets, ApiError> {
        self.devnet.as_ref().ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "devnet",
                format!("fixture assets are not deployed on {}", self.network),
            )
        })
    }
}

/// The faucet token and collectible deployed on the development network.
#[derive(Clone)]
pub struct DevnetAssets {
    pub token: Arc<Mutex<FungibleToken>>,
    pub nifties: Arc<Mutex<CollectibleRegistry>>,
}

impl DevnetAssets {
    /// Creates both fixture contracts and registers them with `ledger`'s
    /// escrow.
    pub fn deploy(ledger: &mut LoanLedger) -> Self {
        let token = Arc::new(Mutex::new(FungibleToken::new(
            Address::from_label("pawnda.development.token"),
            "Dummy Token",
            "DUM",
        )));
        let nifties = Arc::new(Mutex::new(CollectibleRegistry::new(
            Address::from_label("pawnda.development.nifties"),
            "Dummy Nifties",
        )));

        let token_address = ledger.escrow_mut().register_currency(Arc::clone(&token));
        let nifties_address = ledger
            .escrow_mut()
            .register_collateral(Arc::clone(&nifties));
        tracing::info!(
            token = %token_address,
            nifties = %nifties_address,
            "fixture assets deployed"
        );

        Self { token, nifties }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/terms/hash", post(hash_terms_handler))
        .route("/terms/signer", post(terms_signer_handler))
        .route("/loans", post(create_loan_handler))
        .route("/loans/:id", get(loan_handler))
        .route("/loans/:id/due", get(due_handler))
        .route("/loans/:id/repay", post(repay_handler))
        .route("/loans/:id/repay/digest", post(repayment_digest_handler))
        .route("/events", get(events_handler))
        .route("/devnet/assets", get(devnet_assets_handler))
        .route("/devnet/tokens/claim", post(claim_tokens_handler))
        .route("/devnet/tokens/approve", post(approve_tokens_handler))
        .route("/devnet/nifties/claim", post(claim_nifty_handler))
        .route("/devnet/nifties/approve", post(approve_nifty_handler))
        .route("/devnet/accounts/:address", get(devnet_account_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// `validation`, `signature`, `state`, `transfer` or `devnet`.
    pub kind: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::Signature(_) => StatusCode::UNAUTHORIZED,
            LedgerError::State(StateError::NotFound(_)) => StatusCode::NOT_FOUND,
            LedgerError::State(_) => StatusCode::CONFLICT,
            LedgerError::Transfer(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            kind: self.kind.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// A `u128` carried as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uint(#[serde(with = "amount_string")] pub u128);

/// Loan terms as the API accepts them: either the structured object or
/// the positional arrays EVM-style clients produce.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TermsPayload {
    Structured(LoanTerms),
    Positional(PositionalTerms),
}

/// `addresses = [borrower, broker, currency]`,
/// `values = [borrower_nonce, broker_nonce, amount, rate, deadline]`.
#[derive(Debug, Deserialize)]
pub struct PositionalTerms {
    pub addresses: [Address; 3],
    pub collateral_contracts: Vec<Address>,
    pub collateral_ids: Vec<Uint>,
    pub values: [Uint; 5],
}

impl TermsPayload {
    pub fn into_terms(self) -> Result<LoanTerms, ValidationError> {
        match self {
            TermsPayload::Structured(terms) => Ok(terms),
            TermsPayload::Positional(p) => {
                let ids: Vec<u128> = p.collateral_ids.iter().map(|id| id.0).collect();
                LoanTerms::from_positional(
                    p.addresses,
                    &p.collateral_contracts,
                    &ids,
                    p.values.map(|v| v.0),
                )
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignerRequest {
    pub terms: TermsPayload,
    pub signature: RecoverableSignature,
}

#[derive(Debug, Deserialize)]
pub struct CreateLoanRequest {
    /// Account that funds the principal. It must have approved the
    /// custodian on the currency contract.
    pub lender: Address,
    /// The lender's signature over the same terms digest.
    pub lender_signature: RecoverableSignature,
    pub terms: TermsPayload,
    pub borrower_signature: RecoverableSignature,
    #[serde(default)]
    pub broker_signature: Option<RecoverableSignature>,
}

#[derive(Debug, Deserialize)]
pub struct RepayRequest {
    pub payer: Address,
    /// The payer's signature over the repayment digest for `amount`.
    pub payer_signature: RecoverableSignature,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

#[derive(Debug, Deserialize)]
pub struct RepaymentDigestRequest {
    #[serde(with = "amount_string")]
    pub amount: u128,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Index of the first event to return.
    #[serde(default)]
    pub since: usize,
}

#[derive(Debug, Deserialize)]
pub struct ClaimTokensRequest {
    pub to: Address,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

#[derive(Debug, Deserialize)]
pub struct ApproveTokensRequest {
    pub owner: Address,
    /// Defaults to the ledger custodian.
    #[serde(default)]
    pub spender: Option<Address>,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

#[derive(Debug, Deserialize)]
pub struct ClaimNiftyRequest {
    pub to: Address,
}

#[derive(Debug, Deserialize)]
pub struct ApproveNiftyRequest {
    pub owner: Address,
    /// Defaults to the ledger custodian.
    #[serde(default)]
    pub operator: Option<Address>,
    /// A single item. When absent the operator is approved for every item
    /// the owner holds.
    #[serde(default)]
    pub item_id: Option<Uint>,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub custodian: Address,
    pub loan_count: usize,
    pub open_loans: usize,
    /// BLAKE3 Merkle root over every loan record.
    pub state_root: String,
    /// RFC 3339.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DigestResponse {
    pub digest: Digest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignerResponse {
    pub signer: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLoanResponse {
    pub loan_id: LoanId,
    #[serde(with = "amount_string")]
    pub debt: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoanResponse {
    #[serde(flatten)]
    pub loan: Loan,
    pub past_deadline: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DueResponse {
    pub loan_id: LoanId,
    #[serde(with = "amount_string")]
    pub due: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepayResponse {
    pub loan_id: LoanId,
    #[serde(with = "amount_string")]
    pub remaining_debt: u128,
    pub status: LoanStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Pass as `since` to fetch only newer events.
    pub next: usize,
    pub events: Vec<LedgerEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DevnetAssetsResponse {
    pub token: Address,
    pub nifties: Address,
    pub custodian: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "amount_string")]
    pub allowance: u128,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NiftyResponse {
    pub item_id: Uint,
    pub owner: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DevnetAccountResponse {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub token_balance: u128,
    /// What the custodian may currently pull from this account.
    #[serde(with = "amount_string")]
    pub custodian_allowance: u128,
    pub nifties: Vec<Uint>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Does not touch the ledger.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let ledger = state.ledger.read().await;
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        custodian: ledger.custodian(),
        loan_count: ledger.loan_count(),
        open_loans: ledger.open_loan_count(),
        state_root: hex::encode(ledger.state_root()),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /terms/hash`. Hashes whatever it is given; validity is checked at
/// loan creation.
async fn hash_terms_handler(
    State(state): State<AppState>,
    Json(payload): Json<TermsPayload>,
) -> Result<Json<DigestResponse>, ApiError> {
    let terms = payload
        .into_terms()
        .map_err(|e| ApiError::from(LedgerError::from(e)))?;
    let digest = state.ledger.read().await.hash_terms(&terms);
    Ok(Json(DigestResponse { digest }))
}

async fn terms_signer_handler(
    State(state): State<AppState>,
    Json(req): Json<SignerRequest>,
) -> Result<Json<SignerResponse>, ApiError> {
    let terms = req
        .terms
        .into_terms()
        .map_err(|e| ApiError::from(LedgerError::from(e)))?;
    let signer = state
        .ledger
        .read()
        .await
        .get_signer(&req.signature, &terms)
        .map_err(|e| ApiError::from(LedgerError::from(e)))?;
    Ok(Json(SignerResponse { signer }))
}

async fn create_loan_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<CreateLoanResponse>), ApiError> {
    let _timer = state.metrics.operation_latency_seconds.start_timer();
    let terms = req
        .terms
        .into_terms()
        .map_err(|e| state.reject(e.into()))?;

    let mut ledger = state.ledger.write().await;
    let loan_id = ledger
        .create_signed_loan(
            req.lender,
            &req.lender_signature,
            &terms,
            &req.borrower_signature,
            req.broker_signature.as_ref(),
        )
        .map_err(|e| state.reject(e))?;
    let debt = ledger.get_due_amount(loan_id)?;

    state.metrics.loans_created_total.inc();
    state.metrics.open_loans.set(ledger.open_loan_count() as i64);
    Ok((StatusCode::CREATED, Json(CreateLoanResponse { loan_id, debt })))
}

async fn loan_handler(
    State(state): State<AppState>,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<LoanResponse>, ApiError> {
    let ledger = state.ledger.read().await;
    let loan = ledger.get_loan(loan_id)?.clone();
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    Ok(Json(LoanResponse {
        past_deadline: loan.is_past_deadline(now),
        loan,
    }))
}

async fn due_handler(
    State(state): State<AppState>,
    Path(loan_id): Path<LoanId>,
) -> Result<Json<DueResponse>, ApiError> {
    let due = state.ledger.read().await.get_due_amount(loan_id)?;
    Ok(Json(DueResponse { loan_id, due }))
}

/// `POST /loans/:id/repay/digest`. The digest a payer signs to pay
/// `amount` against the debt outstanding right now.
async fn repayment_digest_handler(
    State(state): State<AppState>,
    Path(loan_id): Path<LoanId>,
    Json(req): Json<RepaymentDigestRequest>,
) -> Result<Json<DigestResponse>, ApiError> {
    let outstanding = state.ledger.read().await.get_due_amount(loan_id)?;
    let digest = hash_repayment(loan_id, req.amount, outstanding);
    Ok(Json(DigestResponse { digest }))
}

async fn repay_handler(
    State(state): State<AppState>,
    Path(loan_id): Path<LoanId>,
    Json(req): Json<RepayRequest>,
) -> Result<Json<RepayResponse>, ApiError> {
    let _timer = state.metrics.operation_latency_seconds.start_timer();
    let mut ledger = state.ledger.write().await;
    let remaining_debt = ledger
        .pay_back_signed(req.payer, &req.payer_signature, loan_id, req.amount)
        .map_err(|e| state.reject(e))?;
    let status = ledger.get_loan(loan_id)?.status;

    state.metrics.repayments_total.inc();
    if status == LoanStatus::Closed {
        state.metrics.loans_closed_total.inc();
    }
    state.metrics.open_loans.set(ledger.open_loan_count() as i64);
    Ok(Json(RepayResponse {
        loan_id,
        remaining_debt,
        status,
    }))
}

async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let ledger = state.ledger.read().await;
    let all = ledger.events();
    let start = query.since.min(all.len());
    Json(EventsResponse {
        next: all.len(),
        events: all[start..].to_vec(),
    })
}

// -- Devnet fixtures ----------------------------------------------------------
//
// Writers below take the ledger write lock even though they only touch the
// fixture contracts. Escrow batches checkpoint and roll back those same
// contracts, so a faucet call must never land in the middle of one.

async fn devnet_assets_handler(
    State(state): State<AppState>,
) -> Result<Json<DevnetAssetsResponse>, ApiError> {
    let devnet = state.devnet()?;
    let custodian = state.ledger.read().await.custodian();
    Ok(Json(DevnetAssetsResponse {
        token: devnet.token.lock().address(),
        nifties: devnet.nifties.lock().address(),
        custodian,
    }))
}

async fn claim_tokens_handler(
    State(state): State<AppState>,
    Json(req): Json<ClaimTokensRequest>,
) -> Result<Json<DevnetAccountResponse>, ApiError> {
    let devnet = state.devnet()?;
    let ledger = state.ledger.write().await;
    devnet
        .token
        .lock()
        .claim_free_tokens(&req.to, req.amount)
        .map_err(|e| ApiError::from(LedgerError::from(e)))?;
    tracing::debug!(to = %req.to, amount = req.amount, "faucet tokens claimed");
    Ok(Json(account_view(devnet, &ledger.custodian(), req.to)))
}

async fn approve_tokens_handler(
    State(state): State<AppState>,
    Json(req): Json<ApproveTokensRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let devnet = state.devnet()?;
    let ledger = state.ledger.write().await;
    let spender = req.spender.unwrap_or_else(|| ledger.custodian());

    let mut token = devnet.token.lock();
    token.approve(&req.owner, &spender, req.amount);
    Ok(Json(AllowanceResponse {
        owner: req.owner,
        spender,
        allowance: token.allowance(&req.owner, &spender),
    }))
}

async fn claim_nifty_handler(
    State(state): State<AppState>,
    Json(req): Json<ClaimNiftyRequest>,
) -> Result<Json<NiftyResponse>, ApiError> {
    let devnet = state.devnet()?;
    let _ledger = state.ledger.write().await;
    let item_id = devnet
        .nifties
        .lock()
        .claim_free_nifty(&req.to)
        .map_err(|e| ApiError::from(LedgerError::from(e)))?;
    tracing::debug!(to = %req.to, item_id, "faucet nifty claimed");
    Ok(Json(NiftyResponse {
        item_id: Uint(item_id),
        owner: req.to,
    }))
}

async fn approve_nifty_handler(
    State(state): State<AppState>,
    Json(req): Json<ApproveNiftyRequest>,
) -> Result<StatusCode, ApiError> {
    let devnet = state.devnet()?;
    let ledger = state.ledger.write().await;
    let operator = req.operator.unwrap_or_else(|| ledger.custodian());

    let mut nifties = devnet.nifties.lock();
    match req.item_id {
        Some(Uint(item_id)) => nifties
            .approve(&req.owner, &operator, item_id)
            .map_err(|e| ApiError::from(LedgerError::from(e)))?,
        None => nifties.set_approval_for_all(&req.owner, &operator, true),
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn devnet_account_handler(
    State(state): State<AppState>,
    Path(address): Path<Address>,
) -> Result<Json<DevnetAccountResponse>, ApiError> {
    let devnet = state.devnet()?;
    let ledger = state.ledger.read().await;
    Ok(Json(account_view(devnet, &ledger.custodian(), address)))
}

fn account_view(
    devnet: &DevnetAssets,
    custodian: &Address,
    address: Address,
) -> DevnetAccountResponse {
    let token = devnet.token.lock();
    DevnetAccountResponse {
        address,
        token_balance: token.balance_of(&address),
        custodian_allowance: token.allowance(&address, custodian),
        nifties: devnet
            .nifties
            .lock()
            .items_of(&address)
            .into_iter()
            .map(Uint)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pawnda_contracts::AssetEscrow;
    use pawnda_protocol::crypto::keys::SigningKeypair;
    use pawnda_protocol::terms::{hash_terms, CollateralItem};
    use tower::ServiceExt;

    const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

    fn custodian() -> Address {
        Address::from_label("custodian")
    }

    fn lender_key() -> SigningKeypair {
        SigningKeypair::from_bytes(&[0x11; 32]).unwrap()
    }

    fn lender() -> Address {
        lender_key().address()
    }

    /// A `POST /loans` body with `lender` countersigning the terms.
    fn loan_request(
        lender: &SigningKeypair,
        terms: &LoanTerms,
        borrower_signature: &RecoverableSignature,
    ) -> serde_json::Value {
        let lender_signature = lender.sign_digest(&hash_terms(terms)).unwrap();
        serde_json::json!({
            "lender": lender.address(),
            "lender_signature": lender_signature,
            "terms": terms,
            "borrower_signature": borrower_signature,
        })
    }

    /// Fetches the repayment digest from the node and returns a signed
    /// `POST /loans/:id/repay` body.
    async fn repay_request(
        router: &Router,
        payer: &SigningKeypair,
        loan_id: LoanId,
        amount: u128,
    ) -> serde_json::Value {
        let (status, body) = post(
            router,
            &format!("/loans/{loan_id}/repay/digest"),
            serde_json::json!({ "amount": amount.to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: DigestResponse = serde_json::from_slice(&body).unwrap();
        let signature = payer.sign_digest(&resp.digest).unwrap();
        serde_json::json!({
            "payer": payer.address(),
            "payer_signature": signature,
            "amount": amount.to_string(),
        })
    }

    fn test_app_state(with_devnet: bool) -> AppState {
        let mut ledger = LoanLedger::new(custodian(), AssetEscrow::new());
        let devnet = with_devnet.then(|| DevnetAssets::deploy(&mut ledger));
        AppState {
            version: "0.1.0-test".into(),
            network: if with_devnet { "development" } else { "mainnet" }.into(),
            ledger: Arc::new(RwLock::new(ledger)),
            devnet,
            metrics: Arc::new(crate::metrics::NodeMetrics::new().unwrap()),
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    async fn post(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    /// Runs the faucet and approval calls a borrower and lender need, and
    /// returns signed terms over one freshly claimed nifty.
    async fn prepare_loan(
        router: &Router,
        state: &AppState,
        borrower: &SigningKeypair,
    ) -> (LoanTerms, RecoverableSignature) {
        let devnet = state.devnet.as_ref().unwrap();
        let b = borrower.address().to_hex();

        let claim = serde_json::json!({ "to": b });
        let (status, body) = post(router, "/devnet/nifties/claim", claim).await;
        assert_eq!(status, StatusCode::OK);
        let item_id = json(&body)["item_id"].as_str().unwrap().parse::<u128>().unwrap();

        let (status, _) = post(
            router,
            "/devnet/nifties/approve",
            serde_json::json!({ "owner": b, "item_id": item_id.to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        for who in [lender().to_hex(), b.clone()] {
            let amount = (1_000 * ONE_TOKEN).to_string();
            let (status, _) = post(
                router,
                "/devnet/tokens/claim",
                serde_json::json!({ "to": who, "amount": amount }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let (status, _) = post(
                router,
                "/devnet/tokens/approve",
                serde_json::json!({ "owner": who, "amount": amount }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let terms = LoanTerms {
            borrower: borrower.address(),
            broker: None,
            currency: devnet.token.lock().address(),
            collateral: vec![CollateralItem::new(devnet.nifties.lock().address(), item_id)],
            borrower_nonce: 0,
            broker_nonce: 0,
            amount: 100 * ONE_TOKEN,
            rate: 100,
            deadline: 4_000_000_000,
        };
        let signature = borrower.sign_digest(&hash_terms(&terms)).unwrap();
        (terms, signature)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state(false));
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_an_empty_ledger() {
        let router = create_router(test_app_state(true));
        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);

        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.network, "development");
        assert_eq!(resp.custodian, custodian());
        assert_eq!(resp.loan_count, 0);
        assert_eq!(resp.state_root, hex::encode([0u8; 32]));
    }

    #[tokio::test]
    async fn loan_lifecycle_over_http() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        let borrower = SigningKeypair::generate();
        let (terms, signature) = prepare_loan(&router, &state, &borrower).await;

        let (status, body) = post(
            &router,
            "/loans",
            loan_request(&lender_key(), &terms, &signature),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: CreateLoanResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(created.loan_id, 0);
        assert_eq!(created.debt, ONE_TOKEN);

        let (status, body) = get(&router, "/loans/0/due").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["due"], ONE_TOKEN.to_string());

        let body = repay_request(&router, &borrower, 0, ONE_TOKEN / 2).await;
        let (status, body) = post(&router, "/loans/0/repay", body).await;
        assert_eq!(status, StatusCode::OK);
        let repaid: RepayResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(repaid.remaining_debt, ONE_TOKEN / 2);
        assert_eq!(repaid.status, LoanStatus::Open);

        let (status, body) = get(&router, "/loans/0").await;
        assert_eq!(status, StatusCode::OK);
        let loan = json(&body);
        assert_eq!(loan["status"], "Open");
        assert_eq!(loan["past_deadline"], false);

        let (_, body) = get(&router, "/events").await;
        let events: EventsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(events.next, 2);
        assert_eq!(
            events.events[0],
            LedgerEvent::LoanCreated {
                loan_id: 0,
                borrower: borrower.address(),
                lender: lender(),
            }
        );

        let (_, body) = get(&router, "/events?since=1").await;
        let events: EventsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(events.events.len(), 1);

        let text = state.metrics.encode().unwrap();
        assert!(text.contains("pawnda_loans_created_total 1"));
        assert!(text.contains("pawnda_repayments_total 1"));
        assert!(text.contains("pawnda_open_loans 1"));
    }

    #[tokio::test]
    async fn full_repayment_returns_the_collateral() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        let borrower = SigningKeypair::generate();
        let (terms, signature) = prepare_loan(&router, &state, &borrower).await;

        let (status, _) = post(
            &router,
            "/loans",
            loan_request(&lender_key(), &terms, &signature),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let path = format!("/devnet/accounts/{}", borrower.address().to_hex());
        let (_, body) = get(&router, &path).await;
        let account: DevnetAccountResponse = serde_json::from_slice(&body).unwrap();
        assert!(account.nifties.is_empty());

        let body = repay_request(&router, &borrower, 0, ONE_TOKEN).await;
        let (status, body) = post(&router, "/loans/0/repay", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "Closed");

        let (_, body) = get(&router, &path).await;
        let account: DevnetAccountResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(account.nifties, vec![Uint(terms.collateral[0].item_id)]);

        // Closed loans refuse further payments.
        let body = repay_request(&router, &borrower, 0, 1).await;
        let (status, body) = post(&router, "/loans/0/repay", body).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json(&body)["kind"], "state");
    }

    #[tokio::test]
    async fn wrong_signer_is_unauthorized() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        let borrower = SigningKeypair::generate();
        let (terms, _) = prepare_loan(&router, &state, &borrower).await;
        let forged = SigningKeypair::generate()
            .sign_digest(&hash_terms(&terms))
            .unwrap();

        let (status, body) = post(
            &router,
            "/loans",
            loan_request(&lender_key(), &terms, &forged),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body)["kind"], "signature");
        assert_eq!(state.ledger.read().await.loan_count(), 0);

        let text = state.metrics.encode().unwrap();
        assert!(text.contains("pawnda_rejected_operations_total{kind=\"signature\"} 1"));
    }

    #[tokio::test]
    async fn forged_lender_is_unauthorized() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        let thief = SigningKeypair::generate();
        let (terms, signature) = prepare_loan(&router, &state, &thief).await;

        // The thief names the approved lender but can only sign as themselves.
        let mut body = loan_request(&thief, &terms, &signature);
        body["lender"] = serde_json::json!(lender());

        let (status, body) = post(&router, "/loans", body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body)["kind"], "signature");
        assert_eq!(state.ledger.read().await.loan_count(), 0);

        let devnet = state.devnet.as_ref().unwrap();
        assert_eq!(devnet.token.lock().balance_of(&lender()), 1_000 * ONE_TOKEN);
    }

    #[tokio::test]
    async fn forged_payer_is_unauthorized() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        let borrower = SigningKeypair::generate();
        let (terms, signature) = prepare_loan(&router, &state, &borrower).await;
        let body = loan_request(&lender_key(), &terms, &signature);
        let (status, _) = post(&router, "/loans", body).await;
        assert_eq!(status, StatusCode::CREATED);

        // Spending the borrower's allowance takes the borrower's signature.
        let mut body = repay_request(&router, &SigningKeypair::generate(), 0, ONE_TOKEN).await;
        body["payer"] = serde_json::json!(borrower.address());

        let (status, body) = post(&router, "/loans/0/repay", body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json(&body)["kind"], "signature");
        assert_eq!(state.ledger.read().await.get_due_amount(0).unwrap(), ONE_TOKEN);
    }

    #[tokio::test]
    async fn lender_without_funds_is_unprocessable() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        let borrower = SigningKeypair::generate();
        let (terms, signature) = prepare_loan(&router, &state, &borrower).await;
        let broke = SigningKeypair::generate();

        let (status, body) = post(&router, "/loans", loan_request(&broke, &terms, &signature)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(&body)["kind"], "transfer");
    }

    #[tokio::test]
    async fn invalid_terms_are_bad_requests() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        let borrower = SigningKeypair::generate();
        let (mut terms, _) = prepare_loan(&router, &state, &borrower).await;
        terms.collateral.clear();
        let signature = borrower.sign_digest(&hash_terms(&terms)).unwrap();

        let (status, body) = post(
            &router,
            "/loans",
            loan_request(&lender_key(), &terms, &signature),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["kind"], "validation");
    }

    #[tokio::test]
    async fn missing_loan_is_not_found() {
        let router = create_router(test_app_state(false));
        let (status, body) = get(&router, "/loans/7").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(err.error.contains('7'));
        assert_eq!(err.kind, "state");
    }

    #[tokio::test]
    async fn positional_and_structured_terms_hash_alike() {
        let router = create_router(test_app_state(false));
        let borrower = Address::from_label("borrower");
        let currency = Address::from_label("currency");
        let nifties = Address::from_label("nifties");
        let terms = LoanTerms {
            borrower,
            broker: None,
            currency,
            collateral: vec![CollateralItem::new(nifties, 3)],
            borrower_nonce: 9,
            broker_nonce: 0,
            amount: 100 * ONE_TOKEN,
            rate: 100,
            deadline: 1_700_000_000,
        };

        let body = serde_json::to_value(&terms).unwrap();
        let (status, body) = post(&router, "/terms/hash", body).await;
        assert_eq!(status, StatusCode::OK);
        let structured: DigestResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(structured.digest, hash_terms(&terms));

        let positional = serde_json::json!({
            "addresses": [borrower, Address::ZERO, currency],
            "collateral_contracts": [nifties],
            "collateral_ids": ["3"],
            "values": ["9", "0", (100 * ONE_TOKEN).to_string(), "100", "1700000000"],
        });
        let (status, body) = post(&router, "/terms/hash", positional).await;
        assert_eq!(status, StatusCode::OK);
        let decoded: DigestResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded.digest, structured.digest);
    }

    #[tokio::test]
    async fn positional_length_mismatch_is_rejected() {
        let router = create_router(test_app_state(false));
        let positional = serde_json::json!({
            "addresses": [Address::from_label("b"), Address::ZERO, Address::from_label("c")],
            "collateral_contracts": [Address::from_label("n")],
            "collateral_ids": [],
            "values": ["0", "0", "1", "100", "0"],
        });
        let (status, body) = post(&router, "/terms/hash", positional).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["kind"], "validation");
    }

    #[tokio::test]
    async fn signer_endpoint_recovers_the_borrower() {
        let router = create_router(test_app_state(false));
        let key = SigningKeypair::generate();
        let terms = LoanTerms {
            borrower: key.address(),
            broker: None,
            currency: Address::from_label("currency"),
            collateral: vec![CollateralItem::new(Address::from_label("nifties"), 0)],
            borrower_nonce: 0,
            broker_nonce: 0,
            amount: ONE_TOKEN,
            rate: 100,
            deadline: 0,
        };
        let signature = key.sign_digest(&hash_terms(&terms)).unwrap();

        let (status, body) = post(
            &router,
            "/terms/signer",
            serde_json::json!({ "terms": terms, "signature": signature }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: SignerResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.signer, key.address());
    }

    #[tokio::test]
    async fn devnet_endpoints_are_absent_off_development() {
        let router = create_router(test_app_state(false));
        let (status, body) = get(&router, "/devnet/assets").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["kind"], "devnet");

        let (status, _) = post(
            &router,
            "/devnet/nifties/claim",
            serde_json::json!({ "to": Address::from_label("x") }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
