//! Customer record.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ids, Namespace, StoredObject};

/// A customer of the simulated platform.
///
/// Created by the resource layer; the billing engine reads it to
/// resolve renewal payments and flips `delinquent` once retries run out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(skip)]
    pub namespace: Namespace,
    pub created: i64,
    pub email: Option<String>,
    pub name: Option<String>,
    /// ISO currency code used when a price carries none.
    pub currency: String,
    /// Set once renewal payments fail repeatedly.
    pub delinquent: bool,
}

impl Customer {
    pub fn new(namespace: Namespace, created: i64) -> Self {
        Self {
            id: ids::customer_id(),
            namespace,
            created,
            email: None,
            name: None,
            currency: "usd".to_string(),
            delinquent: false,
        }
    }
}

impl StoredObject for Customer {
    fn id(&self) -> &str {
        &self.id
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn created(&self) -> i64 {
        self.created
    }
}
