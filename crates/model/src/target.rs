use serde::{Deserialize, Serialize};
use std::fmt;

/// A city/state pair that leaf and city-hub pages are generated for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub city: String,
    pub state: String,
}

impl Location {
    pub fn new(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.state)
    }
}

/// The kind of page a work item produces.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Hub,
    Leaf,
    CityHub,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Hub => "hub",
            PageKind::Leaf => "leaf",
            PageKind::CityHub => "city-hub",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive fields of one page to generate.
///
/// Externally tagged so snapshots stay bincode-friendly.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageTarget {
    /// Category page for a single service.
    Hub { service: String },

    /// A service offered in a specific location.
    Leaf {
        service: String,
        city: String,
        state: String,
    },

    /// Page listing every service in one location.
    CityHub { city: String, state: String },
}

impl PageTarget {
    pub fn hub(service: impl Into<String>) -> Self {
        PageTarget::Hub {
            service: service.into(),
        }
    }

    pub fn leaf(service: impl Into<String>, location: &Location) -> Self {
        PageTarget::Leaf {
            service: service.into(),
            city: location.city.clone(),
            state: location.state.clone(),
        }
    }

    pub fn city_hub(location: &Location) -> Self {
        PageTarget::CityHub {
            city: location.city.clone(),
            state: location.state.clone(),
        }
    }

    pub fn kind(&self) -> PageKind {
        match self {
            PageTarget::Hub { .. } => PageKind::Hub,
            PageTarget::Leaf { .. } => PageKind::Leaf,
            PageTarget::CityHub { .. } => PageKind::CityHub,
        }
    }

    /// Derives the dedup identity of this target.
    pub fn canonical_key(&self) -> CanonicalKey {
        let key = match self {
            PageTarget::Hub { service } => format!("hub:{}", slugify(service)),
            PageTarget::Leaf {
                service,
                city,
                state,
            } => format!(
                "leaf:{}:{}:{}",
                slugify(service),
                slugify(city),
                slugify(state)
            ),
            PageTarget::CityHub { city, state } => {
                format!("city-hub:{}:{}", slugify(city), slugify(state))
            }
        };
        CanonicalKey(key)
    }

    /// Key of the page this target hangs under, if it has one.
    pub fn parent_key(&self) -> Option<CanonicalKey> {
        match self {
            PageTarget::Leaf { service, .. } => {
                Some(PageTarget::hub(service.clone()).canonical_key())
            }
            PageTarget::Hub { .. } | PageTarget::CityHub { .. } => None,
        }
    }

    pub fn service(&self) -> Option<&str> {
        match self {
            PageTarget::Hub { service } | PageTarget::Leaf { service, .. } => Some(service),
            PageTarget::CityHub { .. } => None,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            PageTarget::Leaf { city, state, .. } | PageTarget::CityHub { city, state } => {
                Some(Location::new(city.clone(), state.clone()))
            }
            PageTarget::Hub { .. } => None,
        }
    }

    /// Human readable label, used for default titles and exports.
    pub fn label(&self) -> String {
        match self {
            PageTarget::Hub { service } => service.clone(),
            PageTarget::Leaf {
                service,
                city,
                state,
            } => format!("{service} in {city}, {state}"),
            PageTarget::CityHub { city, state } => format!("{city}, {state}"),
        }
    }
}

/// Deterministic identity of one logical page, shared by every job and call path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Wraps an already-derived key (e.g. one echoed back by the remote service).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        CanonicalKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key used for the advisory import lock.
    pub fn lock_key(&self) -> String {
        format!("import-lock:{}", self.0)
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase ASCII slug; any run of non-alphanumerics becomes a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
