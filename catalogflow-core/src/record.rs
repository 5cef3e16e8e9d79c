//! Catalog item as read from the feed, and the document written to the index for it.

use std::collections::BTreeMap;
use std::num::IntErrorKind;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

/// Value of the delete-flag column that marks a record for deletion.
const DELETE_FLAG: &str = "1";

/// One row of the catalog feed. Also the wire shape of a published batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    pub language_code: String,
    pub id: String,
    pub title: String,
    pub link: String,
    /// Raw decimal string, e.g. `1299.99`.
    pub price: String,
    pub currency: String,
    pub image_link: String,
    pub description: String,
    /// Space separated.
    pub additional_image_link: String,
    pub google_product_category: String,
    pub availability_date: String,
    pub product_type: String,
    pub product_code: String,
    pub product_code_type: String,
    pub condition: String,
    pub age_group: String,
    pub color: String,
    pub gender: String,
    pub pattern: String,
    pub size: String,
    pub size_type: String,
    pub size_system: String,
    pub rating: f64,
    pub is_target_for_delete: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Upsert,
    Delete,
}

impl Record {
    pub fn is_deleted(&self) -> bool {
        self.is_target_for_delete == DELETE_FLAG
    }

    pub fn disposition(&self) -> Disposition {
        if self.is_deleted() {
            Disposition::Delete
        } else {
            Disposition::Upsert
        }
    }

    /// Projects the record into its index document, stamped with `now`.
    pub fn to_doc(&self, now: DateTime<Utc>) -> RecordDoc {
        let price = Price::parse(&self.price, &self.currency);

        let mut additional_properties = BTreeMap::new();
        let mut put = |key: &str, value: Value| {
            additional_properties.insert(key.to_string(), value);
        };
        put("googleProductCategory", self.google_product_category.clone().into());
        put("availableFrom", self.availability_date.clone().into());
        put("productType", self.product_type.clone().into());
        put("condition", self.condition.clone().into());
        put("ageGroup", self.age_group.clone().into());
        put("color", self.color.clone().into());
        put("gender", self.gender.clone().into());
        put("pattern", self.pattern.clone().into());
        put("sizeValue", self.size.clone().into());
        put("sizeType", self.size_type.clone().into());
        put("sizeSystem", self.size_system.clone().into());
        put("ratings", self.rating.into());
        put("productCodeType", self.product_code_type.clone().into());
        put("productCode", self.product_code.clone().into());
        put("title", self.title.clone().into());
        put("description", self.description.clone().into());
        put("currencyCode", self.currency.clone().into());
        put("priceMajor", price.price_major.into());
        put("priceMinor", price.price_minor.into());

        RecordDoc {
            id: Uuid::now_v7(),
            sku: self.id.clone(),
            language_code: self.language_code.clone(),
            title: self.title.clone(),
            link: self.link.clone(),
            price,
            images: image_links(&self.image_link, &self.additional_image_link),
            description: self.description.clone(),
            is_deleted: self.is_deleted(),
            record: RecordTimestamps {
                created: now,
                updated: now,
            },
            additional_properties,
        }
    }
}

/// Primary image first, then every additional link that parses as an absolute URL.
fn image_links(primary: &str, additional: &str) -> Vec<String> {
    let mut images = Vec::new();
    if !primary.is_empty() {
        images.push(primary.to_string());
    }
    images.extend(
        additional
            .split(' ')
            .map(str::trim)
            .filter(|link| Url::parse(link).is_ok())
            .map(str::to_string),
    );
    images
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub currency_code: String,
    pub price_major: u32,
    pub price_minor: u32,
}

impl Price {
    /// Splits `raw` on `.`; the first fragment is the major unit, the second the minor unit and
    /// anything after is ignored. Fragments that are not plain digits become 0, digit runs too
    /// large for a `u32` saturate at `u32::MAX`.
    pub fn parse(raw: &str, currency_code: &str) -> Self {
        let mut fragments = raw.split('.');
        Self {
            currency_code: currency_code.to_string(),
            price_major: fragments.next().map(parse_unit).unwrap_or(0),
            price_minor: fragments.next().map(parse_unit).unwrap_or(0),
        }
    }
}

fn parse_unit(fragment: &str) -> u32 {
    if fragment.is_empty() || !fragment.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    match fragment.parse::<u32>() {
        Ok(value) => value,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => u32::MAX,
        Err(_) => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTimestamps {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Body of an `index` operation. Keyed in the index by `sku`, while `id` is a fresh
/// time-ordered surrogate generated on every projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDoc {
    pub id: Uuid,
    pub sku: String,
    pub language_code: String,
    pub title: String,
    pub link: String,
    pub price: Price,
    pub images: Vec<String>,
    pub description: String,
    pub is_deleted: bool,
    pub record: RecordTimestamps,
    pub additional_properties: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_parse() {
        let price = Price::parse("1299.99", "JPY");
        assert_eq!((price.price_major, price.price_minor), (1299, 99));
        assert_eq!(price.currency_code, "JPY");

        let price = Price::parse("1299", "JPY");
        assert_eq!((price.price_major, price.price_minor), (1299, 0));

        let price = Price::parse("abc", "JPY");
        assert_eq!((price.price_major, price.price_minor), (0, 0));

        let price = Price::parse("12.x", "USD");
        assert_eq!((price.price_major, price.price_minor), (12, 0));

        let price = Price::parse("", "USD");
        assert_eq!((price.price_major, price.price_minor), (0, 0));

        let price = Price::parse("-5.10", "USD");
        assert_eq!((price.price_major, price.price_minor), (0, 10));

        let price = Price::parse("+5.+1", "USD");
        assert_eq!((price.price_major, price.price_minor), (0, 0));
    }

    #[test]
    fn test_price_parse_extra_fragments_and_overflow() {
        // only the first two fragments count
        let price = Price::parse("1.2.3", "USD");
        assert_eq!((price.price_major, price.price_minor), (1, 2));

        let price = Price::parse("99999999999.5", "USD");
        assert_eq!((price.price_major, price.price_minor), (u32::MAX, 5));

        let price = Price::parse("10.99999999999", "USD");
        assert_eq!((price.price_major, price.price_minor), (10, u32::MAX));
    }

    #[test]
    fn test_delete_flag() {
        let mut record = Record::default();
        assert!(!record.is_deleted());
        assert_eq!(record.disposition(), Disposition::Upsert);

        record.is_target_for_delete = "1".to_string();
        assert!(record.is_deleted());
        assert_eq!(record.disposition(), Disposition::Delete);

        for flag in ["0", "true", " 1", "11"] {
            record.is_target_for_delete = flag.to_string();
            assert!(!record.is_deleted(), "flag {flag:?} should not delete");
        }
    }

    #[test]
    fn test_image_links() {
        let images = image_links(
            "https://img.example.com/a.jpg",
            "https://img.example.com/b.jpg not-a-url  https://img.example.com/c.jpg",
        );
        assert_eq!(
            images,
            vec![
                "https://img.example.com/a.jpg",
                "https://img.example.com/b.jpg",
                "https://img.example.com/c.jpg",
            ]
        );

        assert!(image_links("", "").is_empty());
        assert_eq!(image_links("", "https://x.io/1.png"), vec!["https://x.io/1.png"]);
    }

    #[test]
    fn test_to_doc() {
        let record = Record {
            language_code: "en".to_string(),
            id: "sku-1".to_string(),
            title: "Red shoe".to_string(),
            price: "10.50".to_string(),
            currency: "USD".to_string(),
            image_link: "https://img.example.com/a.jpg".to_string(),
            color: "red".to_string(),
            rating: 4.5,
            ..Default::default()
        };
        let now = Utc::now();
        let doc = record.to_doc(now);

        assert_eq!(doc.sku, "sku-1");
        assert_eq!(doc.id.get_version_num(), 7);
        assert_eq!(doc.price.price_major, 10);
        assert_eq!(doc.price.price_minor, 50);
        assert_eq!(doc.images.len(), 1);
        assert!(!doc.is_deleted);
        assert_eq!(doc.record.created, now);
        assert_eq!(doc.record.updated, now);
        assert_eq!(doc.additional_properties["color"], "red");
        assert_eq!(doc.additional_properties["ratings"], 4.5);
        assert_eq!(doc.additional_properties["priceMajor"], 10);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["languageCode"], "en");
        assert_eq!(json["price"]["currencyCode"], "USD");
        assert_eq!(json["isDeleted"], false);
        assert!(json["additionalProperties"].is_object());

        assert_ne!(record.to_doc(now).id, doc.id);
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = Record {
            id: "sku-9".to_string(),
            rating: 3.0,
            is_target_for_delete: "1".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&vec![record.clone()]).unwrap();
        let decoded: Vec<Record> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, vec![record]);
    }
}
