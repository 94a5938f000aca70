use serde::Deserialize;
use serde_json::Value;

use crate::error::MigrateError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedResource {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// One link of an evolution chain as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvolutionNode {
    pub species: NamedResource,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub evolves_to: Vec<EvolutionNode>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<EvolutionNode>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<EvolutionNode>>::deserialize(deserializer)?.unwrap_or_default())
}

impl EvolutionNode {
    pub fn new(name: &str, evolves_to: Vec<EvolutionNode>) -> Self {
        Self {
            species: NamedResource {
                name: name.to_string(),
                url: None,
            },
            evolves_to,
        }
    }

    pub fn species_name(&self) -> &str {
        &self.species.name
    }

    /// Reads the `chain` root out of an evolution-chain document.
    pub fn from_document(url: &str, document: &Value) -> Result<Self, MigrateError> {
        let chain = document.get("chain").ok_or_else(|| MigrateError::MissingData {
            url: url.to_string(),
            detail: "evolution chain document has no chain".to_string(),
        })?;
        EvolutionNode::deserialize(chain).map_err(|err| MigrateError::MissingData {
            url: url.to_string(),
            detail: err.to_string(),
        })
    }

    /// Species names in pre-order: each node before its descendants, siblings
    /// in document order.
    pub fn flatten(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect(&mut names);
        names
    }

    fn collect(&self, names: &mut Vec<String>) {
        names.push(self.species.name.clone());
        for next in &self.evolves_to {
            next.collect(names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_is_preorder() {
        let tree = EvolutionNode::new(
            "A",
            vec![
                EvolutionNode::new("B", vec![EvolutionNode::new("D", vec![])]),
                EvolutionNode::new("C", vec![]),
            ],
        );
        assert_eq!(tree.flatten(), vec!["A", "B", "D", "C"]);
    }

    #[test]
    fn parses_api_shape() {
        let doc = json!({
            "id": 67,
            "chain": {
                "species": {"name": "eevee", "url": "https://pokeapi.co/api/v2/pokemon-species/133/"},
                "evolution_details": [],
                "evolves_to": [
                    {"species": {"name": "vaporeon"}, "evolves_to": []},
                    {"species": {"name": "jolteon"}, "evolves_to": null},
                    {"species": {"name": "flareon"}}
                ]
            }
        });
        let root = EvolutionNode::from_document("chain/67", &doc).unwrap();
        assert_eq!(root.species_name(), "eevee");
        assert_eq!(root.flatten(), vec!["eevee", "vaporeon", "jolteon", "flareon"]);
    }

    #[test]
    fn missing_chain_is_missing_data() {
        let err = EvolutionNode::from_document("chain/1", &json!({"id": 1})).unwrap_err();
        assert!(matches!(err, MigrateError::MissingData { .. }));

        let err = EvolutionNode::from_document("chain/1", &json!({"chain": {"evolves_to": []}}))
            .unwrap_err();
        assert!(matches!(err, MigrateError::MissingData { .. }));
    }
}
