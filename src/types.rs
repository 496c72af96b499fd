use std::collections::BTreeMap;

use crate::constants::*;

/// One row of a product table at any stage of the pipeline.
///
/// Numeric fields are already coerced: `None` is the missing marker, never an
/// unparsed string. Columns the pipeline does not know about are carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRecord {
    pub name: String,
    pub price: Option<f64>,
    pub page: Option<u32>,
    pub brand: Option<String>,
    pub quantity: Option<f64>,
    pub product_type: Option<String>,
    pub unit_price: Option<f64>,
    pub cluster: Option<usize>,
    pub extra: BTreeMap<String, String>,
}

impl ProductRecord {
    pub fn new(name: impl Into<String>, price: Option<f64>) -> Self {
        Self {
            name: name.into(),
            price,
            ..Default::default()
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Render a column as it is written to disk; missing values become empty cells.
    pub fn field(&self, column: &str) -> String {
        match column {
            COL_NAME => self.name.clone(),
            COL_PRICE => format_number(self.price),
            COL_PAGE => self.page.map(|p| p.to_string()).unwrap_or_default(),
            COL_BRAND => self.brand.clone().unwrap_or_default(),
            COL_QUANTITY => format_number(self.quantity),
            COL_TYPE => self.product_type.clone().unwrap_or_default(),
            COL_UNIT_PRICE => format_number(self.unit_price),
            COL_CLUSTER => self.cluster.map(|c| c.to_string()).unwrap_or_default(),
            other => self.extra.get(other).cloned().unwrap_or_default(),
        }
    }
}

fn format_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// A product offer as it comes off a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedProduct {
    pub name: String,
    pub price: f64,
    pub page: u32,
}

impl From<ScrapedProduct> for ProductRecord {
    fn from(product: ScrapedProduct) -> Self {
        Self {
            name: product.name,
            price: Some(product.price),
            page: Some(product.page),
            ..Default::default()
        }
    }
}
