//! Merchant-payment simulator.
//!
//! Approved payments are booked as expense transactions through the data
//! context, so they show up in the dashboard like any other spending.

use std::collections::HashMap;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ApiError;
use crate::schemas::{new_id, Transaction, TransactionType, UserId};
use crate::sync::DataContext;

const DEFAULT_CATEGORY: &str = "Merchant";

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentRequest {
    pub merchant: String,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Approved,
    Declined,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub user_id: UserId,
    pub merchant: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub reason: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: String,
}

pub struct PaymentSimulator {
    limit: f64,
    history: Mutex<HashMap<UserId, Vec<Payment>>>,
}

impl PaymentSimulator {
    pub fn new(limit: f64) -> Self {
        PaymentSimulator {
            limit,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub async fn pay(
        &self,
        ctx: &DataContext,
        user_id: &str,
        request: PaymentRequest,
    ) -> Result<Payment, ApiError> {
        let merchant = request.merchant.trim();
        if merchant.is_empty() {
            return Err(ApiError::BadRequest("merchant is required".into()));
        }
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(ApiError::BadRequest("amount must be positive".into()));
        }

        let mut payment = Payment {
            id: new_id(),
            user_id: user_id.to_string(),
            merchant: merchant.to_string(),
            amount: request.amount,
            status: PaymentStatus::Declined,
            reason: None,
            transaction_id: None,
            created_at: Utc::now().to_rfc3339(),
        };

        if request.amount > self.limit {
            payment.reason = Some(format!("amount exceeds the {:.2} limit", self.limit));
        } else {
            let transaction = Transaction {
                id: new_id(),
                user_id: user_id.to_string(),
                kind: TransactionType::Expense,
                amount: request.amount,
                category: request
                    .category
                    .filter(|category| !category.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                date: Local::now().date_naive().format("%Y-%m-%d").to_string(),
                description: format!("Payment to {merchant}"),
            };
            let transaction = ctx.add(user_id, transaction).await?;
            payment.status = PaymentStatus::Approved;
            payment.transaction_id = Some(transaction.id);
        }

        info!(
            user = user_id,
            merchant = %payment.merchant,
            amount = payment.amount,
            status = ?payment.status,
            "simulated payment"
        );
        self.history
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(payment.clone());
        Ok(payment)
    }

    pub async fn history(&self, user_id: &str) -> Vec<Payment> {
        self.history
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}
