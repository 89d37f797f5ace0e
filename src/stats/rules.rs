//! Business rules for reading free-text intervention fields.
//!
//! Status and type labels come from several upstream tools with their own
//! spelling. Everything here is an explicit rule table; extend the tables
//! rather than the matching logic.

/// Canonical intervention type codes.
pub mod codes {
    pub const RACPRO_S: &str = "RACPRO_S";
    pub const RACPRO_C: &str = "RACPRO_C";
    pub const RACPAV: &str = "RACPAV";
    pub const RACIH: &str = "RACIH";
    pub const RECOIP: &str = "RECOIP";
    pub const SAV: &str = "SAV";
    pub const PRESTA_COMPL: &str = "PRESTA_COMPL";
    pub const OTHER: &str = "Other";
}

/// Never shown in the top-types ranking.
pub const HIDDEN_TOP_TYPES: [&str; 2] = [codes::SAV, codes::PRESTA_COMPL];

/// Always shown in the top-types ranking, with a count of 0 if absent.
pub const PINNED_TOP_TYPE: &str = codes::RECOIP;

/// Materials-field codes that decide the type outright, highest priority first.
const MATERIAL_PRIORITY: [&str; 2] = [codes::RACPRO_S, codes::RACPRO_C];

/// Known spellings, keyed on the compacted label (see [`compact`]).
const TYPE_VARIANTS: &[(&str, &str)] = &[
    ("racpros", codes::RACPRO_S),
    ("raccpros", codes::RACPRO_S),
    ("racprosimple", codes::RACPRO_S),
    ("raccordementpros", codes::RACPRO_S),
    ("raccordementprosimple", codes::RACPRO_S),
    ("racproc", codes::RACPRO_C),
    ("raccproc", codes::RACPRO_C),
    ("racprocomplexe", codes::RACPRO_C),
    ("raccordementproc", codes::RACPRO_C),
    ("raccordementprocomplexe", codes::RACPRO_C),
    ("racpav", codes::RACPAV),
    ("raccpav", codes::RACPAV),
    ("raccordementpavillon", codes::RACPAV),
    ("racih", codes::RACIH),
    ("raccih", codes::RACIH),
    ("raccordementimmeuble", codes::RACIH),
    ("recoip", codes::RECOIP),
    ("reconnexion", codes::RECOIP),
    ("reconnexionip", codes::RECOIP),
    ("sav", codes::SAV),
    ("serviceapresvente", codes::SAV),
    ("prestacompl", codes::PRESTA_COMPL),
    ("prestationcomplementaire", codes::PRESTA_COMPL),
];

/// Outcome read from a status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Neither; counted in totals only.
    Undetermined,
}

/// Lower-cased, accent-free, hyphen-separated form (`"Échec Terminée"` → `"echec-terminee"`).
#[must_use]
pub fn normalize(text: &str) -> String {
    slug::slugify(text)
}

/// Alphanumerics only: case, spaces, hyphens and underscores are ignored.
#[must_use]
pub fn compact(text: &str) -> String {
    normalize(text).replace('-', "")
}

/// Failure wins over success when a label mentions both.
#[must_use]
pub fn classify_status(status: &str) -> Outcome {
    let status = normalize(status);
    if status.contains("echec") || status.contains("fail") {
        Outcome::Failure
    } else if status.contains("termine") || status.contains("cloture") {
        Outcome::Success
    } else {
        Outcome::Undetermined
    }
}

#[must_use]
pub fn is_cancelled(status: &str) -> bool {
    normalize(status).contains("annul")
}

#[must_use]
pub fn is_terminated(status: &str) -> bool {
    normalize(status).contains("termine")
}

/// Whether the record's duration belongs in the average: finished (success,
/// or a failure that still reached the terminated state) and not cancelled.
#[must_use]
pub fn counts_for_duration(status: &str) -> bool {
    if is_cancelled(status) {
        return false;
    }
    match classify_status(status) {
        Outcome::Success => true,
        Outcome::Failure => is_terminated(status),
        Outcome::Undetermined => false,
    }
}

/// Resolve a free-text type to its canonical code.
///
/// Rules, first match wins:
/// 1. the materials field lists `RACPRO_S`, else `RACPRO_C`;
/// 2. closed-and-terminated status on a reconnection ⇒ `RECOIP`;
/// 3. known spelling of the type label;
/// 4. the trimmed label itself, or `Other` when blank.
#[must_use]
pub fn canonical_type(kind: Option<&str>, status: Option<&str>, articles: Option<&str>) -> String {
    if let Some(code) = articles.and_then(material_code) {
        return code.to_owned();
    }

    let label = kind.map(str::trim).unwrap_or_default();
    let key = compact(label);

    if status.is_some_and(is_closed_terminated) && key.contains("reco") {
        return codes::RECOIP.to_owned();
    }

    if let Some((_, code)) = TYPE_VARIANTS.iter().find(|(variant, _)| *variant == key) {
        return (*code).to_owned();
    }

    if label.is_empty() {
        codes::OTHER.to_owned()
    } else {
        label.to_owned()
    }
}

fn is_closed_terminated(status: &str) -> bool {
    let status = normalize(status);
    status.contains("cloture") && status.contains("termine")
}

fn material_code(articles: &str) -> Option<&'static str> {
    let items: Vec<String> = articles
        .split([',', ';', '|', '\n', '+'])
        .map(compact)
        .filter(|item| !item.is_empty())
        .collect();

    MATERIAL_PRIORITY
        .into_iter()
        .find(|code| items.iter().any(|item| *item == compact(code)))
}
