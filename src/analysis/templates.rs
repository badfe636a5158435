use super::{Entities, Intent};

/// Canonical question/SQL pair for a simple intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTemplate {
    pub intent: Intent,
    pub pattern: &'static str,
    pub sql: &'static str,
}

pub const QUERY_TEMPLATES: [QueryTemplate; 4] = [
    QueryTemplate {
        intent: Intent::Geographic,
        pattern: "Countries in {region}",
        sql: "SELECT name, ISO_A3 FROM countries WHERE region = '{region}' ORDER BY name",
    },
    QueryTemplate {
        intent: Intent::Population,
        pattern: "Countries with population over {number}",
        sql: "SELECT name, ISO_A3 FROM countries WHERE population > {number} ORDER BY population DESC",
    },
    QueryTemplate {
        intent: Intent::Language,
        pattern: "Countries that speak {language}",
        sql: "SELECT name, ISO_A3 FROM countries WHERE languages LIKE '%{language}%' ORDER BY name",
    },
    QueryTemplate {
        intent: Intent::Flag,
        pattern: "Countries with {color} flags",
        sql: "SELECT name, ISO_A3 FROM countries WHERE flagDescription LIKE '%{color}%' ORDER BY name",
    },
];

impl QueryTemplate {
    pub fn for_intent(intent: Intent) -> Option<&'static QueryTemplate> {
        QUERY_TEMPLATES.iter().find(|t| t.intent == intent)
    }

    /// Fills the placeholder from the first matching entity. `None` when the
    /// analysis did not extract the value this template needs.
    pub fn render(&self, entities: &Entities) -> Option<String> {
        let (placeholder, value) = match self.intent {
            Intent::Geographic => ("{region}", entities.regions.first().map(|r| title_case(r))?),
            Intent::Population => ("{number}", entities.numbers.first()?.to_string()),
            Intent::Language => ("{language}", entities.languages.first().map(|l| title_case(l))?),
            Intent::Flag => ("{color}", entities.colors.first()?.clone()),
            _ => return None,
        };
        Some(self.sql.replace(placeholder, &value))
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QueryAnalyzer;

    fn render(query: &str) -> Option<String> {
        let analysis = QueryAnalyzer::default().classify(query);
        QueryTemplate::for_intent(analysis.intent)?.render(&analysis.entities)
    }

    #[test]
    fn renders_from_extracted_entities() {
        assert_eq!(
            render("Countries in Europe").as_deref(),
            Some("SELECT name, ISO_A3 FROM countries WHERE region = 'Europe' ORDER BY name")
        );
        assert_eq!(
            render("Countries in South America").as_deref(),
            Some("SELECT name, ISO_A3 FROM countries WHERE region = 'South America' ORDER BY name")
        );
        assert_eq!(
            render("Population over 100000000").as_deref(),
            Some("SELECT name, ISO_A3 FROM countries WHERE population > 100000000 ORDER BY population DESC")
        );
        assert_eq!(
            render("Where do people speak Portuguese").as_deref(),
            None, // population intent wins, and no number was given
        );
        assert_eq!(
            render("Countries speaking Portuguese").as_deref(),
            Some("SELECT name, ISO_A3 FROM countries WHERE languages LIKE '%Portuguese%' ORDER BY name")
        );
    }

    #[test]
    fn missing_entity_or_intent_yields_none() {
        assert_eq!(render("Countries in the sea"), None);
        assert_eq!(render("Largest countries"), None);
    }
}
