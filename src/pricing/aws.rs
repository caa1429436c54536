//! AWS Price List API provider
//!
//! Queries `GetProducts` for Linux shared-tenancy EC2 offers and EBS volume
//! prices. Each price list entry is a JSON document; only the on-demand
//! and standard reserved terms are read from it.

use crate::error::{Result, TcoError};
use crate::pricing::provider::PricingProvider;
use crate::pricing::types::{InstancePricing, ReservedRate};
use crate::types::{PaymentOption, Term};
use crate::utils::HOURS_PER_YEAR;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_pricing::types::{Filter, FilterType};
use aws_sdk_pricing::Client as PricingClient;
use serde_json::Value;
use tracing::{debug, warn};

const PROVIDER_NAME: &str = "aws-pricing";

pub struct AwsPricingProvider {
    client: PricingClient,
}

impl AwsPricingProvider {
    /// The Price List API is served from a few endpoints only (us-east-1,
    /// ap-south-1, eu-central-1); `api_region` picks one of them.
    pub async fn new(api_region: &str) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(api_region.to_string()))
            .load()
            .await;
        Self {
            client: PricingClient::new(&aws_config),
        }
    }

    async fn get_products(&self, filters: Vec<Filter>, what: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .get_products()
            .service_code("AmazonEC2")
            .format_version("aws_v1")
            .set_filters(Some(filters))
            .max_results(10)
            .send()
            .await
            .map_err(|e| TcoError::Provider {
                provider: PROVIDER_NAME.to_string(),
                message: format!("GetProducts failed for {}: {}", what, e),
                source: Some(Box::new(e)),
            })?;
        Ok(output.price_list().to_vec())
    }
}

fn term_match(field: &str, value: &str) -> Result<Filter> {
    Filter::builder()
        .r#type(FilterType::TermMatch)
        .field(field)
        .value(value)
        .build()
        .map_err(|e| TcoError::provider(PROVIDER_NAME, format!("Invalid filter {}: {}", field, e)))
}

#[async_trait]
impl PricingProvider for AwsPricingProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch_instance_pricing(
        &self,
        instance_type: &str,
        region: &str,
    ) -> Result<InstancePricing> {
        let filters = vec![
            term_match("instanceType", instance_type)?,
            term_match("regionCode", region)?,
            term_match("operatingSystem", "Linux")?,
            term_match("tenancy", "Shared")?,
            term_match("preInstalledSw", "NA")?,
            term_match("capacitystatus", "Used")?,
            term_match("licenseModel", "No License required")?,
        ];
        let documents = self
            .get_products(filters, &format!("{} in {}", instance_type, region))
            .await?;

        let mut pricing = InstancePricing::default();
        for document in &documents {
            match parse_instance_document(document) {
                Ok(parsed) => merge(&mut pricing, parsed),
                Err(e) => warn!("Skipping unreadable price list entry for {}: {}", instance_type, e),
            }
        }
        debug!(
            "{} {}: on-demand {:?}, {} reserved offers",
            instance_type,
            region,
            pricing.on_demand_hourly,
            pricing.reserved.len()
        );
        Ok(pricing)
    }

    async fn fetch_storage_price(&self, volume_type: &str, region: &str) -> Result<Option<f64>> {
        let filters = vec![
            term_match("productFamily", "Storage")?,
            term_match("volumeApiName", volume_type)?,
            term_match("regionCode", region)?,
        ];
        let documents = self
            .get_products(filters, &format!("EBS {} in {}", volume_type, region))
            .await?;

        Ok(first_storage_rate(&documents, volume_type))
    }
}

fn merge(into: &mut InstancePricing, other: InstancePricing) {
    if into.on_demand_hourly.is_none() {
        into.on_demand_hourly = other.on_demand_hourly;
    }
    for rate in other.reserved {
        if into.reserved_rate(rate.term, rate.payment_option).is_none() {
            into.reserved.push(rate);
        }
    }
}

fn parse_document(document: &str) -> Result<Value> {
    serde_json::from_str(document).map_err(|e| {
        TcoError::provider(PROVIDER_NAME, format!("Malformed price list entry: {}", e))
    })
}

fn usd(dimension: &Value) -> Option<f64> {
    dimension
        .pointer("/pricePerUnit/USD")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<f64>().ok())
}

fn dimensions<'a>(term: &'a Value) -> impl Iterator<Item = &'a Value> + 'a {
    term.get("priceDimensions")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|m| m.values())
}

fn terms<'a>(doc: &'a Value, kind: &str) -> impl Iterator<Item = &'a Value> + 'a {
    doc.get("terms")
        .and_then(|t| t.get(kind))
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|m| m.values())
}

/// Parse one EC2 price list entry
pub fn parse_instance_document(document: &str) -> Result<InstancePricing> {
    let doc = parse_document(document)?;
    let mut pricing = InstancePricing::default();

    pricing.on_demand_hourly = terms(&doc, "OnDemand")
        .flat_map(dimensions)
        .filter(|d| d.get("unit").and_then(Value::as_str) == Some("Hrs"))
        .filter_map(usd)
        .find(|rate| *rate > 0.0);

    for term in terms(&doc, "Reserved") {
        let attrs = match term.get("termAttributes") {
            Some(a) => a,
            None => continue,
        };
        let attr = |name: &str| attrs.get(name).and_then(Value::as_str);
        if attr("OfferingClass") != Some("standard") {
            continue;
        }
        let term_len = match attr("LeaseContractLength") {
            Some("1yr") => Term::OneYear,
            Some("3yr") => Term::ThreeYear,
            _ => continue,
        };
        let payment = match attr("PurchaseOption") {
            Some("No Upfront") => PaymentOption::NoUpfront,
            Some("Partial Upfront") => PaymentOption::PartialUpfront,
            Some("All Upfront") => PaymentOption::AllUpfront,
            _ => continue,
        };

        let mut hourly = 0.0;
        let mut upfront = 0.0;
        for dimension in dimensions(term) {
            let price = usd(dimension).unwrap_or(0.0);
            match dimension.get("unit").and_then(Value::as_str) {
                Some("Hrs") => hourly += price,
                Some("Quantity") => upfront += price,
                _ => {}
            }
        }
        let effective = hourly + upfront / (HOURS_PER_YEAR * term_len.years() as f64);
        if effective > 0.0 && pricing.reserved_rate(term_len, payment).is_none() {
            pricing.reserved.push(ReservedRate {
                term: term_len,
                payment_option: payment,
                effective_hourly: effective,
            });
        }
    }

    Ok(pricing)
}

/// Parse one EBS price list entry into USD per GB-month
pub fn parse_storage_document(document: &str) -> Result<Option<f64>> {
    let doc = parse_document(document)?;
    let rate = terms(&doc, "OnDemand")
        .flat_map(dimensions)
        .filter(|d| d.get("unit").and_then(Value::as_str) == Some("GB-Mo"))
        .filter_map(usd)
        .find(|rate| *rate > 0.0);
    Ok(rate)
}

/// First usable GB-month rate across the returned entries
fn first_storage_rate(documents: &[String], volume_type: &str) -> Option<f64> {
    documents.iter().find_map(|document| match parse_storage_document(document) {
        Ok(rate) => rate,
        Err(e) => {
            warn!("Skipping unreadable price list entry for {}: {}", volume_type, e);
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const M6I_LARGE: &str = r#"{
        "product": {"sku": "ABC", "attributes": {"instanceType": "m6i.large", "regionCode": "us-east-1"}},
        "terms": {
            "OnDemand": {
                "ABC.JRTCKXETXF": {
                    "priceDimensions": {
                        "ABC.JRTCKXETXF.6YS6EN2CT7": {
                            "unit": "Hrs",
                            "pricePerUnit": {"USD": "0.0960000000"}
                        }
                    },
                    "termAttributes": {}
                }
            },
            "Reserved": {
                "ABC.4NA7Y494T4": {
                    "priceDimensions": {
                        "ABC.4NA7Y494T4.6YS6EN2CT7": {
                            "unit": "Hrs",
                            "pricePerUnit": {"USD": "0.0600000000"}
                        }
                    },
                    "termAttributes": {
                        "LeaseContractLength": "1yr",
                        "OfferingClass": "standard",
                        "PurchaseOption": "No Upfront"
                    }
                },
                "ABC.6QCMYABX3D": {
                    "priceDimensions": {
                        "ABC.6QCMYABX3D.2TG2D8R56U": {
                            "unit": "Quantity",
                            "pricePerUnit": {"USD": "876"}
                        },
                        "ABC.6QCMYABX3D.6YS6EN2CT7": {
                            "unit": "Hrs",
                            "pricePerUnit": {"USD": "0.0000000000"}
                        }
                    },
                    "termAttributes": {
                        "LeaseContractLength": "3yr",
                        "OfferingClass": "standard",
                        "PurchaseOption": "All Upfront"
                    }
                },
                "ABC.CONVERTIBLE": {
                    "priceDimensions": {
                        "ABC.CONVERTIBLE.6YS6EN2CT7": {
                            "unit": "Hrs",
                            "pricePerUnit": {"USD": "0.0700000000"}
                        }
                    },
                    "termAttributes": {
                        "LeaseContractLength": "1yr",
                        "OfferingClass": "convertible",
                        "PurchaseOption": "No Upfront"
                    }
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_on_demand_and_standard_reserved() {
        let pricing = parse_instance_document(M6I_LARGE).unwrap();
        assert_eq!(pricing.on_demand_hourly, Some(0.096));
        assert_eq!(pricing.reserved.len(), 2);
        assert_eq!(
            pricing.reserved_rate(Term::OneYear, PaymentOption::NoUpfront),
            Some(0.06)
        );
        // 876 / (8760 * 3)
        let all_upfront = pricing
            .reserved_rate(Term::ThreeYear, PaymentOption::AllUpfront)
            .unwrap();
        assert!((all_upfront - 876.0 / 26280.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_entry_without_terms() {
        let pricing = parse_instance_document(r#"{"product": {}}"#).unwrap();
        assert!(pricing.is_empty());
    }

    #[test]
    fn test_parse_malformed_entry_is_provider_error() {
        assert!(matches!(
            parse_instance_document("{"),
            Err(TcoError::Provider { .. })
        ));
    }

    #[test]
    fn test_parse_storage() {
        let doc = r#"{
            "product": {"productFamily": "Storage"},
            "terms": {"OnDemand": {"X.Y": {"priceDimensions": {"X.Y.Z": {
                "unit": "GB-Mo", "pricePerUnit": {"USD": "0.0800000000"}
            }}}}}
        }"#;
        assert_eq!(parse_storage_document(doc).unwrap(), Some(0.08));
    }

    #[test]
    fn test_malformed_storage_entry_is_skipped() {
        let documents = vec![
            "{".to_string(),
            r#"{"terms": {"OnDemand": {"X.Y": {"priceDimensions": {"X.Y.Z": {
                "unit": "GB-Mo", "pricePerUnit": {"USD": "0.1000000000"}
            }}}}}}"#
                .to_string(),
        ];
        assert_eq!(first_storage_rate(&documents, "gp2"), Some(0.1));
        assert_eq!(first_storage_rate(&documents[..1], "gp2"), None);
    }

    #[test]
    fn test_merge_keeps_first_seen() {
        let mut pricing = InstancePricing {
            on_demand_hourly: Some(0.1),
            reserved: vec![],
        };
        merge(
            &mut pricing,
            InstancePricing {
                on_demand_hourly: Some(0.2),
                reserved: vec![ReservedRate {
                    term: Term::OneYear,
                    payment_option: PaymentOption::NoUpfront,
                    effective_hourly: 0.07,
                }],
            },
        );
        assert_eq!(pricing.on_demand_hourly, Some(0.1));
        assert_eq!(pricing.reserved.len(), 1);
    }
}
