use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

static EN_CATALOG: Lazy<Value> =
    Lazy::new(|| serde_json::from_str(include_str!("../locales/en.json")).unwrap_or_default());
static AR_CATALOG: Lazy<Value> =
    Lazy::new(|| serde_json::from_str(include_str!("../locales/ar.json")).unwrap_or_default());

const AR_MONTHS: [&str; 12] = [
    "يناير",
    "فبراير",
    "مارس",
    "أبريل",
    "مايو",
    "يونيو",
    "يوليو",
    "أغسطس",
    "سبتمبر",
    "أكتوبر",
    "نوفمبر",
    "ديسمبر",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    En,
    Ar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Ar];

    /// Unsupported or empty tags fall back to English. Region subtags are
    /// ignored (`ar-EG` is Arabic).
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag.trim().split(['-', '_']).next().unwrap_or_default();
        match primary.to_ascii_lowercase().as_str() {
            "ar" => Locale::Ar,
            _ => Locale::En,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ar => "ar",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Locale::En => Direction::Ltr,
            Locale::Ar => Direction::Rtl,
        }
    }

    /// The language toggle flips between the two supported locales.
    pub fn toggled(self) -> Self {
        match self {
            Locale::En => Locale::Ar,
            Locale::Ar => Locale::En,
        }
    }

    fn catalog(self) -> &'static Value {
        match self {
            Locale::En => Lazy::force(&EN_CATALOG),
            Locale::Ar => Lazy::force(&AR_CATALOG),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Locale::from_tag(s))
    }
}

/// Message catalog for one locale. Lookups use dotted keys
/// (`favoritesPage.title`); a key missing from the catalog falls back to
/// English, then to the key itself.
#[derive(Debug, Clone)]
pub struct Messages {
    locale: Locale,
    catalog: Value,
}

impl Messages {
    pub fn for_locale(locale: Locale) -> Self {
        Self {
            locale,
            catalog: locale.catalog().clone(),
        }
    }

    /// Load `<dir>/<tag>.json`. An unsupported tag loads the default
    /// locale's file instead.
    pub fn load_dir(dir: &Path, tag: &str) -> Result<Self> {
        let locale = Locale::from_tag(tag);
        let path = dir.join(format!("{}.json", locale.tag()));
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading message catalog {}", path.display()))?;
        let catalog: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing message catalog {}", path.display()))?;
        Ok(Self { locale, catalog })
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn t(&self, key: &str) -> String {
        lookup(&self.catalog, key)
            .or_else(|| lookup(&EN_CATALOG, key))
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string())
    }

    /// Like [`Messages::t`], replacing `{name}` placeholders.
    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        args.iter().fold(self.t(key), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), value)
        })
    }
}

fn lookup<'a>(catalog: &'a Value, key: &str) -> Option<&'a str> {
    key.split('.')
        .try_fold(catalog, |node, part| node.get(part))
        .and_then(Value::as_str)
}

pub fn format_runtime(minutes: u32, locale: Locale) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match locale {
        Locale::Ar => format!("{hours} ساعة {mins} دقيقة"),
        Locale::En => format!("{hours}h {mins}m"),
    }
}

pub fn format_rating(rating: f64) -> String {
    format!("{rating:.1}")
}

fn parse_release_date(release_date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(release_date.trim(), "%Y-%m-%d").ok()
}

pub fn release_year(release_date: &str) -> Option<i32> {
    parse_release_date(release_date).map(|d| d.year())
}

/// Long-form date ("January 5, 2024" / "5 يناير 2024"). Unparseable input
/// is returned as-is.
pub fn format_release_date(release_date: &str, locale: Locale) -> String {
    let Some(date) = parse_release_date(release_date) else {
        return release_date.to_string();
    };
    match locale {
        Locale::En => date.format("%B %-d, %Y").to_string(),
        Locale::Ar => {
            let month = AR_MONTHS[date.month0() as usize];
            format!("{} {} {}", date.day(), month, date.year())
        }
    }
}
