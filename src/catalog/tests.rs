//! Tests for the field catalog

use super::*;
use crate::error::Error;
use crate::types::{AdProduct, ReportType};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use test_case::test_case;

#[test]
fn test_every_registered_pair_has_fields() {
    let catalog = FieldCatalog::standard();
    let pairs: Vec<_> = catalog.registered().collect();
    assert_eq!(pairs.len(), 4);

    for (product, report_type) in pairs {
        let fields = catalog.fields_for(product, report_type).unwrap();
        assert!(!fields.is_empty(), "{product}/{report_type} has no fields");

        let unique: HashSet<_> = fields.iter().collect();
        assert_eq!(unique.len(), fields.len(), "{product}/{report_type} repeats a field");
    }
}

#[test]
fn test_fields_are_order_stable() {
    let catalog = FieldCatalog::standard();
    let first = catalog
        .fields_for(AdProduct::Search, ReportType::AdConversion)
        .unwrap();
    let second = catalog
        .fields_for(AdProduct::Search, ReportType::AdConversion)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![
            "ACCOUNT_ID",
            "ACCOUNT_NAME",
            "DAY",
            "DEVICE",
            "CAMPAIGN_ID",
            "ADGROUP_ID",
            "AD_ID",
            "CONVERSION_NAME",
            "CONVERSIONS",
        ]
    );
}

#[test_case(AdProduct::Display, ReportType::Keywords)]
#[test_case(AdProduct::Display, ReportType::AdConversion)]
fn test_unregistered_pair_fails(product: AdProduct, report_type: ReportType) {
    let catalog = FieldCatalog::standard();
    assert!(!catalog.is_registered(product, report_type));
    assert!(matches!(
        catalog.fields_for(product, report_type),
        Err(Error::UnknownReportType { .. })
    ));
}

#[test]
fn test_validate_fields() {
    let catalog = FieldCatalog::standard();

    catalog
        .validate_fields(
            AdProduct::Search,
            ReportType::Keywords,
            &["KEYWORD".to_string(), "DAY".to_string()],
        )
        .unwrap();

    assert!(matches!(
        catalog.validate_fields(AdProduct::Search, ReportType::Keywords, &[]),
        Err(Error::EmptyFieldList { .. })
    ));

    match catalog.validate_fields(
        AdProduct::Display,
        ReportType::Ad,
        &["DAY".to_string(), "KEYWORD".to_string()],
    ) {
        Err(Error::UnknownField { field, .. }) => assert_eq!(field, "KEYWORD"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_validate_fields_unregistered_pair_wins_over_empty() {
    let catalog = FieldCatalog::standard();
    assert!(matches!(
        catalog.validate_fields(AdProduct::Display, ReportType::Keywords, &[]),
        Err(Error::UnknownReportType { .. })
    ));
}

#[test]
fn test_request_name_for_label() {
    let catalog = FieldCatalog::standard();
    assert_eq!(
        catalog.request_name_for_label(AdProduct::Search, ReportType::Ad, "広告ID"),
        Some("AD_ID")
    );
    assert_eq!(
        catalog.request_name_for_label(AdProduct::Display, ReportType::Ad, "クリック数"),
        Some("CLICK")
    );
    assert_eq!(
        catalog.request_name_for_label(AdProduct::Search, ReportType::Ad, "COST"),
        Some("COST")
    );
    assert_eq!(
        catalog.request_name_for_label(AdProduct::Search, ReportType::Ad, "unknown"),
        None
    );
}

#[test_case(AdProduct::Search, ReportType::Ad, Some("AD"))]
#[test_case(AdProduct::Search, ReportType::AdConversion, Some("AD"))]
#[test_case(AdProduct::Search, ReportType::Keywords, Some("KEYWORDS"))]
#[test_case(AdProduct::Display, ReportType::Ad, None)]
fn test_platform_report_type(
    product: AdProduct,
    report_type: ReportType,
    expected: Option<&str>,
) {
    assert_eq!(
        FieldCatalog::standard().platform_report_type(product, report_type),
        expected
    );
}

#[test]
fn test_catalog_version() {
    assert_eq!(FieldCatalog::default().version(), CATALOG_VERSION);
}
