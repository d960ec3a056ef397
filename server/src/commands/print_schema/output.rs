//! Output formatting for print-schema results.

use super::execute::PrintSchemaResult;
use crate::output::Outputable;

impl Outputable for PrintSchemaResult {
    fn to_text(&self) -> String {
        format!("# {}\n{}", self.origin, self.sdl.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use rstest::{fixture, rstest};

    #[fixture]
    fn result() -> PrintSchemaResult {
        PrintSchemaResult {
            origin: "acme/schemas/schema.graphql".to_string(),
            types: vec!["Query".to_string()],
            sdl: "type Query {\n  ping: String\n}\n".to_string(),
        }
    }

    #[rstest]
    fn test_text_is_commented_sdl(result: PrintSchemaResult) {
        assert_eq!(
            result.format(OutputFormat::Text),
            "# acme/schemas/schema.graphql\ntype Query {\n  ping: String\n}"
        );
    }

    #[rstest]
    fn test_json_has_types_and_sdl(result: PrintSchemaResult) {
        let parsed: serde_json::Value = serde_json::from_str(&result.format(OutputFormat::Json)).unwrap();
        assert_eq!(parsed["types"], serde_json::json!(["Query"]));
        assert_eq!(parsed["origin"], "acme/schemas/schema.graphql");
        assert!(parsed["sdl"].as_str().unwrap().contains("ping: String"));
    }
}
