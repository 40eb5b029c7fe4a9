use serde::{Deserialize, Serialize};

use crate::models::SellerId;

/// Where the buyer wants things delivered: free text or an already geocoded district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTarget {
    Address(String),
    DistrictId(i64),
}

impl DeliveryTarget {
    pub fn is_blank(&self) -> bool {
        match self {
            DeliveryTarget::Address(address) => address.trim().is_empty(),
            DeliveryTarget::DistrictId(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryCheckRequest<'a> {
    pub seller_id: SellerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district_id: Option<i64>,
}

impl<'a> DeliveryCheckRequest<'a> {
    pub fn new(seller_id: SellerId, target: &'a DeliveryTarget) -> Self {
        match target {
            DeliveryTarget::Address(address) => Self {
                seller_id,
                address: Some(address.as_str()),
                district_id: None,
            },
            DeliveryTarget::DistrictId(id) => Self {
                seller_id,
                address: None,
                district_id: Some(*id),
            },
        }
    }
}
