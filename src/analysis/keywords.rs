use super::Intent;
use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Keywords that select one intent. Order inside [`KeywordTables::intents`]
/// is the classification priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentKeywords {
    pub intent: Intent,
    pub keywords: Vec<String>,
}

/// Static dictionaries driving [`super::QueryAnalyzer`].
///
/// Every entry is matched as a lower-case substring of the lower-cased query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTables {
    pub intents: Vec<IntentKeywords>,
    pub regions: Vec<String>,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub colors: Vec<String>,
    pub comparisons: Vec<String>,
}

impl KeywordTables {
    /// Loads tables from a TOML or JSON file; sections left out keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut tables: KeywordTables = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        tables.normalize();
        Ok(tables)
    }

    fn normalize(&mut self) {
        let lower = |words: &mut Vec<String>| {
            for word in words.iter_mut() {
                *word = word.to_lowercase();
            }
        };
        for entry in &mut self.intents {
            lower(&mut entry.keywords);
        }
        lower(&mut self.regions);
        lower(&mut self.countries);
        lower(&mut self.languages);
        lower(&mut self.colors);
        lower(&mut self.comparisons);
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTables {
    fn default() -> Self {
        let intents = vec![
            IntentKeywords {
                intent: Intent::Geographic,
                keywords: words(&["countries in", "located in", "region", "continent"]),
            },
            IntentKeywords {
                intent: Intent::Population,
                keywords: words(&["population", "populated", "people", "inhabitants", "populous"]),
            },
            IntentKeywords {
                intent: Intent::Language,
                keywords: words(&["language", "speak", "speaking", "official language"]),
            },
            IntentKeywords {
                intent: Intent::Flag,
                keywords: words(&["flag", "color", "red flag", "blue flag", "star", "cross"]),
            },
            IntentKeywords {
                intent: Intent::Currency,
                keywords: words(&["currency", "money", "euro", "dollar", "use"]),
            },
            IntentKeywords {
                intent: Intent::Size,
                keywords: words(&["largest", "biggest", "smallest", "area", "size", "km"]),
            },
            IntentKeywords {
                intent: Intent::Border,
                keywords: words(&["border", "neighbor", "next to", "adjacent"]),
            },
        ];

        Self {
            intents,
            regions: words(&[
                "europe",
                "asia",
                "africa",
                "americas",
                "oceania",
                "north america",
                "south america",
            ]),
            countries: words(&[
                "france", "germany", "italy", "spain", "uk", "usa", "china", "japan", "india",
                "brazil",
            ]),
            languages: words(&[
                "english",
                "spanish",
                "french",
                "german",
                "portuguese",
                "arabic",
                "chinese",
            ]),
            colors: words(&["red", "blue", "green", "yellow", "white", "black", "orange"]),
            comparisons: words(&[
                "more than",
                "less than",
                "over",
                "under",
                "above",
                "below",
                "greater",
                "smaller",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_priority_order() {
        let order: Vec<Intent> = KeywordTables::default()
            .intents
            .iter()
            .map(|entry| entry.intent)
            .collect();
        assert_eq!(
            order,
            vec![
                Intent::Geographic,
                Intent::Population,
                Intent::Language,
                Intent::Flag,
                Intent::Currency,
                Intent::Size,
                Intent::Border,
            ]
        );
    }

    #[test]
    fn file_overrides_are_lower_cased_and_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.toml");
        std::fs::write(
            &path,
            "colors = [\"Purple\", \"red\"]\n\n[[intents]]\nintent = \"flag\"\nkeywords = [\"Banner\"]\n",
        )
        .unwrap();

        let tables = KeywordTables::from_file(&path).unwrap();

        assert_eq!(tables.colors, vec!["purple", "red"]);
        assert_eq!(tables.intents.len(), 1);
        assert_eq!(tables.intents[0].keywords, vec!["banner"]);
        assert_eq!(tables.regions, KeywordTables::default().regions);
    }
}
