// 💱 Commodity Entity - currency with a fixed fractional denominator
//
// Immutable once written. Accounts and splits reference commodities by guid,
// and every split value is expressed over the commodity's fraction.

use crate::guid::{new_id, Guid};
use serde::Serialize;

pub const CURRENCY_NAMESPACE: &str = "CURRENCY";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commodity {
    pub guid: Guid,

    /// "CURRENCY" for ISO 4217 codes
    pub namespace: String,

    /// ISO code (e.g., "USD")
    pub mnemonic: String,

    pub fullname: String,

    /// Smallest unit as a denominator (100 for cents)
    pub fraction: i64,
}

impl Commodity {
    /// New ISO currency with its standard fraction
    pub fn currency(mnemonic: &str) -> Self {
        let mnemonic = mnemonic.to_ascii_uppercase();
        Commodity {
            guid: new_id(),
            namespace: CURRENCY_NAMESPACE.to_string(),
            fullname: currency_fullname(&mnemonic).to_string(),
            fraction: iso_fraction(&mnemonic),
            mnemonic,
        }
    }
}

/// Minor-unit denominator for an ISO 4217 code
pub fn iso_fraction(code: &str) -> i64 {
    match code {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX"
        | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 1,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 1000,
        _ => 100,
    }
}

fn currency_fullname(code: &str) -> &'static str {
    match code {
        "USD" => "US Dollar",
        "EUR" => "Euro",
        "GBP" => "British Pound",
        "CAD" => "Canadian Dollar",
        "MXN" => "Mexican Peso",
        "JPY" => "Yen",
        _ => "",
    }
}

/// Three uppercase ASCII letters, as ISO 4217 requires
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}
