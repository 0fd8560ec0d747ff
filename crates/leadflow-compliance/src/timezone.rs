// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Jurisdiction code to IANA timezone resolution.

use chrono_tz::Tz;

/// The timezone used for a two-letter US state, DC or territory code.
///
/// States spanning more than one zone resolve to the zone covering most of
/// their population. Unknown or missing codes resolve to `default`.
pub fn timezone_for_state(code: Option<&str>, default: Tz) -> Tz {
    let Some(code) = code else {
        return default;
    };
    match code.trim().to_ascii_uppercase().as_str() {
        "CT" | "DE" | "DC" | "FL" | "GA" | "ME" | "MD" | "MA" | "NH" | "NJ" | "NY" | "NC"
        | "OH" | "PA" | "RI" | "SC" | "VT" | "VA" | "WV" => Tz::America__New_York,
        "KY" => Tz::America__Kentucky__Louisville,
        "MI" => Tz::America__Detroit,
        "IN" => Tz::America__Indiana__Indianapolis,
        "AL" | "AR" | "IL" | "IA" | "KS" | "LA" | "MN" | "MS" | "MO" | "NE" | "ND" | "OK"
        | "SD" | "TN" | "TX" | "WI" => Tz::America__Chicago,
        "CO" | "MT" | "NM" | "UT" | "WY" => Tz::America__Denver,
        "ID" => Tz::America__Boise,
        "AZ" => Tz::America__Phoenix,
        "CA" | "NV" | "OR" | "WA" => Tz::America__Los_Angeles,
        "AK" => Tz::America__Anchorage,
        "HI" => Tz::Pacific__Honolulu,
        "PR" => Tz::America__Puerto_Rico,
        "VI" => Tz::America__St_Thomas,
        "GU" => Tz::Pacific__Guam,
        "MP" => Tz::Pacific__Saipan,
        "AS" => Tz::Pacific__Pago_Pago,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: [&str; 56] = [
        "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
        "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
        "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
        "VT", "VA", "WA", "WV", "WI", "WY", "PR", "VI", "GU", "MP", "AS",
    ];

    #[test]
    fn representative_states() {
        let default = Tz::UTC;
        assert_eq!(timezone_for_state(Some("FL"), default), Tz::America__New_York);
        assert_eq!(timezone_for_state(Some("tx"), default), Tz::America__Chicago);
        assert_eq!(timezone_for_state(Some(" co "), default), Tz::America__Denver);
        assert_eq!(timezone_for_state(Some("AZ"), default), Tz::America__Phoenix);
        assert_eq!(timezone_for_state(Some("CA"), default), Tz::America__Los_Angeles);
        assert_eq!(timezone_for_state(Some("HI"), default), Tz::Pacific__Honolulu);
        assert_eq!(timezone_for_state(Some("PR"), default), Tz::America__Puerto_Rico);
    }

    #[test]
    fn every_known_code_resolves_without_default() {
        for code in ALL_CODES {
            assert_ne!(
                timezone_for_state(Some(code), Tz::UTC),
                Tz::UTC,
                "{code} fell back to the default"
            );
        }
    }

    #[test]
    fn unknown_or_missing_code_uses_default() {
        let default = Tz::America__New_York;
        assert_eq!(timezone_for_state(None, default), default);
        assert_eq!(timezone_for_state(Some("ZZ"), default), default);
        assert_eq!(timezone_for_state(Some(""), Tz::America__Chicago), Tz::America__Chicago);
    }
}
