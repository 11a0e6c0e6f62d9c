use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub surname: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub city: String,
    pub street: String,
    pub flat: String,
    pub entrance: String,
}

impl std::fmt::Display for DeliveryAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.street, self.city)?;
        if !self.flat.is_empty() {
            write!(f, ", flat {}", self.flat)?;
        }
        if !self.entrance.is_empty() {
            write!(f, ", entrance {}", self.entrance)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer: Customer,
    pub address: DeliveryAddress,
    pub order_price: f64,
    pub delivery_price: f64,
    pub is_paid: bool,
    pub is_assembled: bool,
    pub is_received: bool,
    pub delivery_due_at: Option<DateTime<Utc>>,
    pub assigned_courier: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
}
