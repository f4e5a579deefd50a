use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed taxonomy a post is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Android,
    #[serde(rename = "iOS")]
    Ios,
    Windows,
    Web,
    General,
    /// Only ever assigned from tags; users cannot subscribe to it.
    Beta,
}

impl Category {
    /// Categories offered for subscription.
    pub const SUBSCRIBABLE: [Category; 5] = [
        Category::Android,
        Category::Ios,
        Category::Windows,
        Category::Web,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Android => "Android",
            Category::Ios => "iOS",
            Category::Windows => "Windows",
            Category::Web => "Web",
            Category::General => "General",
            Category::Beta => "Beta",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Category::Android => "🤖",
            Category::Ios => "🍎",
            Category::Windows => "💻",
            Category::Web => "🌐",
            Category::General => "📱",
            Category::Beta => "🧪",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Category::Android),
            "ios" => Ok(Category::Ios),
            "windows" => Ok(Category::Windows),
            "web" => Ok(Category::Web),
            "general" => Ok(Category::General),
            "beta" => Ok(Category::Beta),
            other => anyhow::bail!("unknown category: {}", other),
        }
    }
}

/// Keyword rules, checked in this order within each tag.
const RULES: &[(&[&str], Category)] = &[
    (&["android"], Category::Android),
    (&["ios", "iphone"], Category::Ios),
    (&["windows", "desktop"], Category::Windows),
    (&["web"], Category::Web),
    (&["beta"], Category::Beta),
];

/// Map free-text feed tags to `(emoji, category)`.
///
/// Tags are scanned in input order and the first tag matching any rule decides.
/// Nothing matching yields `General`.
pub fn categorize<S: AsRef<str>>(tags: &[S]) -> (&'static str, Category) {
    for tag in tags {
        let lowered = tag.as_ref().to_lowercase();
        for (keywords, category) in RULES {
            if keywords.iter().any(|k| lowered.contains(k)) {
                return (category.emoji(), *category);
            }
        }
    }
    (Category::General.emoji(), Category::General)
}
