//! Arabic normalization.
//!
//! Fixed order: diacritics, tatweel, hamza-carrier alef variants, ya/alef
//! maqsura, ta marbuta (matching profile only), Arabic-Indic digits,
//! punctuation, whitespace collapse. The matching profile is aggressive;
//! the embedding profile keeps ta marbuta and punctuation so semantic
//! vectors stay closer to the surface text.

/// Diacritic range (tashkeel) plus the superscript alef.
fn is_diacritic(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}')
}

const TATWEEL: char = '\u{0640}';

/// Alef variants collapsing to bare alef.
fn map_alef(c: char) -> char {
    match c {
        '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => '\u{0627}', // آ أ إ ٱ -> ا
        other => other,
    }
}

/// Hamza-on-carrier variants collapsing to the bare hamza.
fn map_hamza_carrier(c: char) -> char {
    match c {
        '\u{0624}' | '\u{0626}' => '\u{0621}', // ؤ ئ -> ء
        other => other,
    }
}

/// Alef maqsura and Farsi yeh collapsing to Arabic yeh.
fn map_yeh(c: char) -> char {
    match c {
        '\u{0649}' | '\u{06CC}' => '\u{064A}', // ى ی -> ي
        other => other,
    }
}

const TEH_MARBUTA: char = '\u{0629}';
const HEH: char = '\u{0647}';

fn map_digit(c: char) -> char {
    match c {
        '\u{0660}'..='\u{0669}' => {
            char::from_u32('0' as u32 + (c as u32 - 0x0660)).unwrap_or(c)
        }
        '\u{06F0}'..='\u{06F9}' => {
            char::from_u32('0' as u32 + (c as u32 - 0x06F0)).unwrap_or(c)
        }
        other => other,
    }
}

fn map_punctuation(c: char) -> char {
    match c {
        '\u{060C}' => ',', // ،
        '\u{061B}' => ';', // ؛
        '\u{061F}' => '?', // ؟
        '\u{06D4}' => '.',
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
struct Profile {
    hamza_carriers: bool,
    teh_marbuta_to_heh: bool,
    punctuation: bool,
}

fn normalize(text: &str, profile: Profile) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if is_diacritic(c) || c == TATWEEL {
            continue;
        }
        let mut c = map_alef(c);
        if profile.hamza_carriers {
            c = map_hamza_carrier(c);
        }
        c = map_yeh(c);
        if profile.teh_marbuta_to_heh && c == TEH_MARBUTA {
            c = HEH;
        }
        c = map_digit(c);
        if profile.punctuation {
            c = map_punctuation(c);
        }
        out.push(c);
    }

    // Whitespace collapse, always last.
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Aggressive normalization for entity matching and exact lookup.
///
/// Ta marbuta maps to heh so that ة/ه spelling variants of the same name
/// compare equal.
pub fn normalize_for_matching(text: &str) -> String {
    normalize(
        text,
        Profile {
            hamza_carriers: true,
            teh_marbuta_to_heh: true,
            punctuation: true,
        },
    )
}

/// Moderate normalization for embedding input.
pub fn normalize_for_embedding(text: &str) -> String {
    normalize(
        text,
        Profile {
            hamza_carriers: false,
            teh_marbuta_to_heh: false,
            punctuation: false,
        },
    )
}

/// Whether the text contains any Arabic-block letters.
pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}
