//! Field tables and lookups

use crate::error::{Error, Result};
use crate::types::{AdProduct, ReportType};

/// Version of the platform API the tables were captured from
pub const CATALOG_VERSION: &str = "v10";

/// One requestable report column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEntry {
    /// Identifier sent in the `fields` array
    pub request_name: &'static str,
    /// Column label the platform writes into Japanese-language CSV headers
    pub label: &'static str,
}

const fn field(request_name: &'static str, label: &'static str) -> FieldEntry {
    FieldEntry {
        request_name,
        label,
    }
}

/// Field list registered for one (ad product, report type) pair
#[derive(Debug, Clone, Copy)]
pub struct ReportTable {
    /// Advertising surface
    pub ad_product: AdProduct,
    /// Report shape
    pub report_type: ReportType,
    /// Ordered fields
    pub fields: &'static [FieldEntry],
}

const SEARCH_AD: &[FieldEntry] = &[
    field("ACCOUNT_ID", "アカウントID"),
    field("ACCOUNT_NAME", "アカウント名"),
    field("DAY", "日"),
    field("DEVICE", "デバイス"),
    field("CAMPAIGN_ID", "キャンペーンID"),
    field("CAMPAIGN_NAME", "キャンペーン名"),
    field("ADGROUP_ID", "広告グループID"),
    field("ADGROUP_NAME", "広告グループ名"),
    field("AD_ID", "広告ID"),
    field("AD_NAME", "広告名"),
    field("COST", "コスト"),
    field("IMPS", "インプレッション数"),
    field("CLICKS", "クリック数"),
    field("CLICK_RATE", "クリック率"),
    field("AVG_CPC", "平均CPC"),
    field("CONVERSIONS", "コンバージョン数"),
    field("CONV_RATE", "コンバージョン率"),
];

const SEARCH_AD_CONVERSION: &[FieldEntry] = &[
    field("ACCOUNT_ID", "アカウントID"),
    field("ACCOUNT_NAME", "アカウント名"),
    field("DAY", "日"),
    field("DEVICE", "デバイス"),
    field("CAMPAIGN_ID", "キャンペーンID"),
    field("ADGROUP_ID", "広告グループID"),
    field("AD_ID", "広告ID"),
    field("CONVERSION_NAME", "コンバージョン名"),
    field("CONVERSIONS", "コンバージョン数"),
];

const SEARCH_KEYWORDS: &[FieldEntry] = &[
    field("ACCOUNT_ID", "アカウントID"),
    field("ACCOUNT_NAME", "アカウント名"),
    field("DAY", "日"),
    field("DEVICE", "デバイス"),
    field("CAMPAIGN_ID", "キャンペーンID"),
    field("CAMPAIGN_NAME", "キャンペーン名"),
    field("ADGROUP_ID", "広告グループID"),
    field("ADGROUP_NAME", "広告グループ名"),
    field("KEYWORD_ID", "キーワードID"),
    field("KEYWORD", "キーワード"),
    field("COST", "コスト"),
    field("IMPS", "インプレッション数"),
    field("CLICKS", "クリック数"),
    field("CLICK_RATE", "クリック率"),
    field("AVG_CPC", "平均CPC"),
    field("CONVERSIONS", "コンバージョン数"),
    field("CONV_RATE", "コンバージョン率"),
];

const DISPLAY_AD: &[FieldEntry] = &[
    field("ACCOUNT_ID", "アカウントID"),
    field("ACCOUNT_NAME", "アカウント名"),
    field("DAY", "日"),
    field("DEVICE", "デバイス"),
    field("CAMPAIGN_ID", "キャンペーンID"),
    field("CAMPAIGN_NAME", "キャンペーン名"),
    field("ADGROUP_ID", "広告グループID"),
    field("ADGROUP_NAME", "広告グループ名"),
    field("AD_ID", "広告ID"),
    field("AD_NAME", "広告名"),
    field("SEARCHKEYWORD_ID", "サーチキーワードID"),
    field("SEARCHKEYWORD", "サーチキーワード"),
    field("COST", "コスト"),
    field("IMPS", "インプレッション数"),
    field("VIEWABLE_IMPS", "ビューアブルインプレッション数"),
    field("CLICK", "クリック数"),
    field("CLICK_RATE", "クリック率"),
    field("CONVERSIONS", "コンバージョン数"),
    field("CONV_RATE", "コンバージョン率"),
    field("AVG_CPC", "平均CPC"),
    field("AVG_CPM", "平均CPM"),
    field("AVG_DELIVER_RANK", "平均掲載順位"),
];

const TABLES: &[ReportTable] = &[
    ReportTable {
        ad_product: AdProduct::Search,
        report_type: ReportType::Ad,
        fields: SEARCH_AD,
    },
    ReportTable {
        ad_product: AdProduct::Search,
        report_type: ReportType::AdConversion,
        fields: SEARCH_AD_CONVERSION,
    },
    ReportTable {
        ad_product: AdProduct::Search,
        report_type: ReportType::Keywords,
        fields: SEARCH_KEYWORDS,
    },
    ReportTable {
        ad_product: AdProduct::Display,
        report_type: ReportType::Ad,
        fields: DISPLAY_AD,
    },
];

/// Immutable field catalog
#[derive(Debug, Clone, Copy)]
pub struct FieldCatalog {
    version: &'static str,
    tables: &'static [ReportTable],
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl FieldCatalog {
    /// The built-in catalog
    pub const fn standard() -> Self {
        Self {
            version: CATALOG_VERSION,
            tables: TABLES,
        }
    }

    /// API version the tables belong to
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Every registered (ad product, report type) pair
    pub fn registered(&self) -> impl Iterator<Item = (AdProduct, ReportType)> + '_ {
        self.tables.iter().map(|t| (t.ad_product, t.report_type))
    }

    /// Whether the pair is registered
    pub fn is_registered(&self, ad_product: AdProduct, report_type: ReportType) -> bool {
        self.table(ad_product, report_type).is_some()
    }

    fn table(&self, ad_product: AdProduct, report_type: ReportType) -> Option<&ReportTable> {
        self.tables
            .iter()
            .find(|t| t.ad_product == ad_product && t.report_type == report_type)
    }

    /// Ordered field entries for the pair
    pub fn entries_for(
        &self,
        ad_product: AdProduct,
        report_type: ReportType,
    ) -> Result<&'static [FieldEntry]> {
        self.table(ad_product, report_type)
            .map(|t| t.fields)
            .ok_or_else(|| Error::UnknownReportType {
                ad_product: ad_product.to_string(),
                report_type: report_type.to_string(),
            })
    }

    /// Ordered field identifiers for the pair
    pub fn fields_for(
        &self,
        ad_product: AdProduct,
        report_type: ReportType,
    ) -> Result<Vec<&'static str>> {
        Ok(self
            .entries_for(ad_product, report_type)?
            .iter()
            .map(|f| f.request_name)
            .collect())
    }

    /// Check a requested field list against the registered fields
    pub fn validate_fields(
        &self,
        ad_product: AdProduct,
        report_type: ReportType,
        fields: &[String],
    ) -> Result<()> {
        let entries = self.entries_for(ad_product, report_type)?;

        if fields.is_empty() {
            return Err(Error::EmptyFieldList {
                ad_product: ad_product.to_string(),
                report_type: report_type.to_string(),
            });
        }

        if let Some(unknown) = fields
            .iter()
            .find(|name| !entries.iter().any(|e| e.request_name == name.as_str()))
        {
            return Err(Error::UnknownField {
                ad_product: ad_product.to_string(),
                report_type: report_type.to_string(),
                field: unknown.clone(),
            });
        }

        Ok(())
    }

    /// Map a CSV header label back to its field identifier
    pub fn request_name_for_label(
        &self,
        ad_product: AdProduct,
        report_type: ReportType,
        label: &str,
    ) -> Option<&'static str> {
        self.table(ad_product, report_type)?
            .fields
            .iter()
            .find(|f| f.label == label || f.request_name == label)
            .map(|f| f.request_name)
    }

    /// Value of the platform's `reportType` request field.
    ///
    /// Search conversion columns live in the platform's AD report; display
    /// reports do not take a report type at all.
    pub fn platform_report_type(
        &self,
        ad_product: AdProduct,
        report_type: ReportType,
    ) -> Option<&'static str> {
        match (ad_product, report_type) {
            (AdProduct::Search, ReportType::Keywords) => Some("KEYWORDS"),
            (AdProduct::Search, ReportType::Ad | ReportType::AdConversion) => Some("AD"),
            (AdProduct::Display, _) => None,
        }
    }
}
