//! Phone number normalization and mobile-money operator inference.
//!
//! Numbers are handled as bare digit strings in international format
//! (calling code followed by the subscriber number, no `+`).

use crate::domain::provider::ProviderId;

/// Longest national number we accept before assuming a calling code is
/// already present.
const MAX_NATIONAL_DIGITS: usize = 10;

/// Valid subscriber prefixes for one operator in one country.
struct PrefixRule {
    calling_code: &'static str,
    prefixes: &'static [&'static str],
    /// Digits following the prefix.
    remaining_digits: usize,
}

impl PrefixRule {
    fn matches(&self, subscriber: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            subscriber.len() == prefix.len() + self.remaining_digits
                && subscriber.starts_with(prefix)
        })
    }
}

const MTN_RULES: &[PrefixRule] = &[
    // Togo
    PrefixRule {
        calling_code: "228",
        prefixes: &["90", "91", "92", "93"],
        remaining_digits: 6,
    },
    // Ghana
    PrefixRule {
        calling_code: "233",
        prefixes: &["24", "54", "55", "59"],
        remaining_digits: 7,
    },
];

const MOOV_FLOOZ_RULES: &[PrefixRule] = &[PrefixRule {
    calling_code: "228",
    prefixes: &["96", "97", "98", "99"],
    remaining_digits: 6,
}];

const ORANGE_RULES: &[PrefixRule] = &[
    // Senegal
    PrefixRule {
        calling_code: "221",
        prefixes: &["77", "78"],
        remaining_digits: 7,
    },
    // Mali
    PrefixRule {
        calling_code: "223",
        prefixes: &["07", "09"],
        remaining_digits: 7,
    },
];

const WAVE_RULES: &[PrefixRule] = &[PrefixRule {
    calling_code: "221",
    prefixes: &["77", "78"],
    remaining_digits: 7,
}];

fn rules_for(provider: ProviderId) -> Option<&'static [PrefixRule]> {
    match provider {
        ProviderId::Mtn => Some(MTN_RULES),
        ProviderId::Moov | ProviderId::Flooz => Some(MOOV_FLOOZ_RULES),
        ProviderId::Orange => Some(ORANGE_RULES),
        ProviderId::Wave => Some(WAVE_RULES),
        ProviderId::Paypal | ProviderId::Stripe => None,
    }
}

/// Converts a user-entered number to international digits.
///
/// `+228 90 12 34 56`, `0022890123456` and `90123456` (with default code
/// `228`) all become `22890123456`.
pub fn normalize(phone_number: &str, default_country_code: &str) -> String {
    let trimmed = phone_number.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if trimmed.starts_with('+') {
        return digits;
    }
    if let Some(international) = digits.strip_prefix("00") {
        return international.to_string();
    }
    if digits.len() <= MAX_NATIONAL_DIGITS {
        let country: String = default_country_code
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        return format!("{country}{digits}");
    }
    digits
}

/// Checks a normalized number against the operator's prefix table.
///
/// Countries without a rule for a mobile-money operator are accepted as-is.
/// This leniency is intentional: operators cover more countries than the
/// table lists, and rejecting them would block legitimate payers. Gateways
/// are never phone-addressed and always return `false`.
pub fn is_valid_for_provider(normalized_number: &str, provider: ProviderId) -> bool {
    let Some(rules) = rules_for(provider) else {
        return false;
    };
    if normalized_number.is_empty() || !normalized_number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match rules
        .iter()
        .find(|rule| normalized_number.starts_with(rule.calling_code))
    {
        Some(rule) => rule.matches(&normalized_number[rule.calling_code.len()..]),
        None => true,
    }
}

/// First mobile-money operator, in registration order, accepting the number.
pub fn identify_provider(normalized_number: &str) -> Option<ProviderId> {
    ProviderId::MOBILE_MONEY
        .into_iter()
        .find(|provider| is_valid_for_provider(normalized_number, *provider))
}
