//! Country names to two-letter flag codes.
//!
//! The table accepts English names, common abbreviations and Spanish
//! spellings.  Lookups never fail: unknown names map to [`FALLBACK_CODE`].

/// Code used for unknown or missing countries.
pub const FALLBACK_CODE: &str = "un";

static COUNTRY_CODES: &[(&str, &str)] = &[
    // Americas
    ("United States", "us"),
    ("United States of America", "us"),
    ("USA", "us"),
    ("Canada", "ca"),
    ("Mexico", "mx"),
    ("Brazil", "br"),
    ("Argentina", "ar"),
    ("Colombia", "co"),
    ("Peru", "pe"),
    ("Chile", "cl"),
    ("Ecuador", "ec"),
    ("Venezuela", "ve"),
    ("Guatemala", "gt"),
    ("Cuba", "cu"),
    ("Bolivia", "bo"),
    ("Dominican Republic", "do"),
    ("Honduras", "hn"),
    ("Paraguay", "py"),
    ("El Salvador", "sv"),
    ("Nicaragua", "ni"),
    ("Costa Rica", "cr"),
    ("Panama", "pa"),
    ("Uruguay", "uy"),
    ("Jamaica", "jm"),
    ("Global", "un"),
    ("Unknown", "un"),
    // Europe
    ("United Kingdom", "gb"),
    ("Great Britain", "gb"),
    ("UK", "gb"),
    ("Germany", "de"),
    ("France", "fr"),
    ("Italy", "it"),
    ("Spain", "es"),
    ("Portugal", "pt"),
    ("Netherlands", "nl"),
    ("Belgium", "be"),
    ("Switzerland", "ch"),
    ("Austria", "at"),
    ("Sweden", "se"),
    ("Norway", "no"),
    ("Denmark", "dk"),
    ("Finland", "fi"),
    ("Ireland", "ie"),
    ("Poland", "pl"),
    ("Czech Republic", "cz"),
    ("Hungary", "hu"),
    ("Romania", "ro"),
    ("Greece", "gr"),
    ("Ukraine", "ua"),
    ("Russia", "ru"),
    ("Russian Federation", "ru"),
    // Asia
    ("China", "cn"),
    ("Japan", "jp"),
    ("India", "in"),
    ("South Korea", "kr"),
    ("Korea, Republic of", "kr"),
    ("Indonesia", "id"),
    ("Vietnam", "vn"),
    ("Thailand", "th"),
    ("Malaysia", "my"),
    ("Philippines", "ph"),
    ("Singapore", "sg"),
    ("Israel", "il"),
    ("Saudi Arabia", "sa"),
    ("United Arab Emirates", "ae"),
    ("Qatar", "qa"),
    ("Kuwait", "kw"),
    ("Turkey", "tr"),
    ("Iran", "ir"),
    ("Iraq", "iq"),
    ("Pakistan", "pk"),
    ("Bangladesh", "bd"),
    // Africa
    ("Egypt", "eg"),
    ("South Africa", "za"),
    ("Nigeria", "ng"),
    ("Ethiopia", "et"),
    ("Kenya", "ke"),
    ("Ghana", "gh"),
    ("Morocco", "ma"),
    ("Algeria", "dz"),
    // Oceania
    ("Australia", "au"),
    ("New Zealand", "nz"),
    // Spanish spellings
    ("España", "es"),
    ("México", "mx"),
    ("Perú", "pe"),
    ("República Dominicana", "do"),
    ("Panamá", "pa"),
];

/// Resolves the flag code for `country`.
///
/// An explicit, non-empty `provided` code wins and is lowercased.  Otherwise
/// the trimmed name is looked up exactly, then case-insensitively.
pub fn country_code(country: Option<&str>, provided: Option<&str>) -> String {
    if let Some(code) = provided.filter(|code| !code.is_empty()) {
        return code.to_lowercase();
    }

    let name = match country.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return String::from(FALLBACK_CODE),
    };

    if let Some((_, code)) = COUNTRY_CODES.iter().find(|(key, _)| *key == name)
    {
        return String::from(*code);
    }

    let lowered = name.to_lowercase();
    COUNTRY_CODES
        .iter()
        .find(|(key, _)| key.to_lowercase() == lowered)
        .map(|(_, code)| String::from(*code))
        .unwrap_or_else(|| String::from(FALLBACK_CODE))
}
