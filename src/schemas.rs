use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub type UserId = String;

/// The collections kept in the document store, one per record type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Transactions,
    Budgets,
    Bills,
    Notes,
    Documents,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Transactions => "transactions",
            Collection::Budgets => "budgets",
            Collection::Bills => "bills",
            Collection::Notes => "notes",
            Collection::Documents => "documents",
        }
    }

    /// Singular noun used in user-facing messages.
    pub fn item(self) -> &'static str {
        match self {
            Collection::Transactions => "transaction",
            Collection::Budgets => "budget",
            Collection::Bills => "bill",
            Collection::Notes => "note",
            Collection::Documents => "document",
        }
    }
}

/// A user-owned record that lives in one store collection.
pub trait Record: Clone + Serialize + DeserializeOwned + Unpin + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn user_id(&self) -> &str;
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub category: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub user_id: UserId,
    pub category: String,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    #[serde(default)]
    pub due_time: String,
    #[serde(default)]
    pub is_paid: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    pub content_type: String,
    pub size: usize,
    pub data: String,
    pub uploaded_at: String,
}

macro_rules! record {
    ($ty:ty, $collection:expr) => {
        impl Record for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn user_id(&self) -> &str {
                &self.user_id
            }
        }
    };
}

record!(Transaction, Collection::Transactions);
record!(Budget, Collection::Budgets);
record!(Bill, Collection::Bills);
record!(Note, Collection::Notes);
record!(StoredDocument, Collection::Documents);

// Request bodies. The server owns `id` and `userId`.

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub category: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
}

impl TransactionDraft {
    pub fn into_record(self, id: String, user_id: UserId) -> Transaction {
        Transaction {
            id,
            user_id,
            kind: self.kind,
            amount: self.amount,
            category: self.category,
            date: self.date,
            description: self.description,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BudgetDraft {
    pub category: String,
    pub amount: f64,
}

impl BudgetDraft {
    pub fn into_record(self, id: String, user_id: UserId) -> Budget {
        Budget {
            id,
            user_id,
            category: self.category,
            amount: self.amount,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDraft {
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    #[serde(default)]
    pub due_time: String,
    #[serde(default)]
    pub is_paid: bool,
}

impl BillDraft {
    pub fn into_record(self, id: String, user_id: UserId) -> Bill {
        Bill {
            id,
            user_id,
            name: self.name,
            amount: self.amount,
            due_date: self.due_date,
            due_time: self.due_time,
            is_paid: self.is_paid,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NoteDraft {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl NoteDraft {
    pub fn into_record(self, id: String, user_id: UserId, created_at: String) -> Note {
        Note {
            id,
            user_id,
            title: self.title,
            content: self.content,
            created_at,
        }
    }
}
