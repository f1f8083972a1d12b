use barry_model::ToolDescriptor;
use barry_tool_session::ToolOutput;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value, json};

use crate::dataset::{Dataset, SkuRecord};

const MAX_DESCRIPTION_CHARS: usize = 500;

/// Returns the tools the worker exposes, in listing order.
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::from_input_schema(
            "query_skus_by_fat",
            "Query Material_Code (SKUs) based on fat content with comparison \
             operators (==, <, <=, >, >=)",
            json!({
                "type": "object",
                "properties": {
                    "n": {
                        "type": "integer",
                        "description": "Number of results to return",
                        "minimum": 1,
                        "default": 10
                    },
                    "fat_value": {
                        "type": "number",
                        "description": "Fat content threshold value (in grams)"
                    },
                    "operator": {
                        "type": "string",
                        "description": "Comparison operator to use",
                        "enum": ["==", "<", "<=", ">", ">="],
                        "default": ">"
                    }
                },
                "required": ["fat_value"]
            }),
        ),
        ToolDescriptor::from_input_schema(
            "query_chocolate_products",
            "Search for chocolate products by type (Dark/Milk/White) and \
             moulding type (e.g., callets). Validates Material_Code prefix.",
            json!({
                "type": "object",
                "properties": {
                    "n": {
                        "type": "integer",
                        "description": "Number of results to return",
                        "minimum": 1,
                        "default": 5
                    },
                    "chocolate_type": {
                        "type": "string",
                        "description": "Type of chocolate base",
                        "enum": ["Dark", "Milk", "White"]
                    },
                    "moulding_type": {
                        "type": "string",
                        "description": "Moulding type to search for - uses \
                            flexible string matching (e.g., 'callets', \
                            'chips', 'blocks', 'drops', 'bars', etc.)"
                    }
                },
                "required": ["chocolate_type", "moulding_type"]
            }),
        ),
    ]
}

/// Runs a tool against `dataset`.
///
/// Like a real worker, problems with the arguments are reported as regular
/// text rather than as a failed call.
pub fn call(
    dataset: &Dataset,
    name: &str,
    arguments: Map<String, Value>,
) -> ToolOutput {
    let text = match name {
        "query_skus_by_fat" => {
            parse(arguments).map(|q| query_skus_by_fat(dataset, &q))
        }
        "query_chocolate_products" => {
            parse(arguments).map(|q| query_chocolate_products(dataset, &q))
        }
        _ => Ok(format!("❌ Unknown tool: {name}")),
    };
    ToolOutput::text(text.unwrap_or_else(|err| format!("❌ Error: {err}")))
}

fn parse<T: DeserializeOwned>(
    arguments: Map<String, Value>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(arguments))
}

/// Arguments of `query_skus_by_fat`.
#[derive(Clone, Debug, Deserialize)]
pub struct FatQuery {
    #[serde(default = "default_fat_limit")]
    pub n: usize,
    pub fat_value: Number,
    #[serde(default = "default_operator")]
    pub operator: String,
}

fn default_fat_limit() -> usize {
    10
}

fn default_operator() -> String {
    ">".to_owned()
}

/// Arguments of `query_chocolate_products`.
#[derive(Clone, Debug, Deserialize)]
pub struct ChocolateQuery {
    #[serde(default = "default_chocolate_limit")]
    pub n: usize,
    pub chocolate_type: ChocolateType,
    pub moulding_type: String,
}

fn default_chocolate_limit() -> usize {
    5
}

/// The chocolate bases a query can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub enum ChocolateType {
    Dark,
    Milk,
    White,
}

impl ChocolateType {
    fn as_str(self) -> &'static str {
        match self {
            ChocolateType::Dark => "Dark",
            ChocolateType::Milk => "Milk",
            ChocolateType::White => "White",
        }
    }

    fn sku_prefix(self) -> &'static str {
        match self {
            ChocolateType::Dark => "CHD-",
            ChocolateType::Milk => "CHM-",
            ChocolateType::White => "CHW-",
        }
    }
}

/// Lists the SKUs whose fat content satisfies the comparison.
pub fn query_skus_by_fat(dataset: &Dataset, query: &FatQuery) -> String {
    let threshold = query.fat_value.as_f64().unwrap_or(f64::NAN);
    let compare: fn(f64, f64) -> bool = match query.operator.as_str() {
        "==" => |a, b| a == b,
        "<" => |a, b| a < b,
        "<=" => |a, b| a <= b,
        ">" => |a, b| a > b,
        ">=" => |a, b| a >= b,
        op => return format!("❌ Invalid operator: {op}"),
    };

    let results: Vec<(&SkuRecord, f64)> = dataset
        .records()
        .iter()
        .filter_map(|r| r.fat.map(|fat| (r, fat)))
        .filter(|(_, fat)| compare(*fat, threshold))
        .take(query.n)
        .collect();

    let op = &query.operator;
    let value = &query.fat_value;
    if results.is_empty() {
        return format!("🔍 No SKUs found where Fat {op} {value}g");
    }

    let mut lines = vec![format!(
        "📊 Found {} SKU(s) where Fat {op} {value}g:\n",
        results.len()
    )];
    for (record, fat) in results {
        lines.push(format!(
            "  • **{}** (Fat: {}g)",
            record.material_code,
            format_float(fat)
        ));
        lines.push(format!("    📝 {}", record.material_description));
        push_description(&mut lines, record);
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Lists the chocolate products of a base and moulding type.
pub fn query_chocolate_products(
    dataset: &Dataset,
    query: &ChocolateQuery,
) -> String {
    let base = query.chocolate_type.as_str();
    let prefix = query.chocolate_type.sku_prefix();
    let moulding = query.moulding_type.to_lowercase();

    let results: Vec<&SkuRecord> = dataset
        .records()
        .iter()
        .filter(|r| {
            let product_type = r.product_type.to_lowercase();
            product_type == "chocolate"
                || (product_type.contains("chocolate")
                    && product_type.contains("< 5% veg fat"))
        })
        .filter(|r| r.base_type.eq_ignore_ascii_case(base))
        .filter(|r| r.moulding_type.to_lowercase().contains(&moulding))
        .filter(|r| r.material_code.starts_with(prefix))
        .take(query.n)
        .collect();

    if results.is_empty() {
        return format!(
            "🔍 No {base} chocolate products found with moulding type \
             '{moulding}'"
        );
    }

    let mut lines = vec![format!(
        "🍫 Found {} {base} chocolate product(s) with moulding type \
         '{moulding}':\n",
        results.len()
    )];
    for record in results {
        lines.push(format!("  ✓ **{}**", record.material_code));
        lines.push(format!("    📝 {}", record.material_description));
        lines.push(format!(
            "    Base: {} | Moulding: {}",
            record.base_type, record.moulding_type
        ));
        push_description(&mut lines, record);
        lines.push(String::new());
    }
    lines.join("\n")
}

fn push_description(lines: &mut Vec<String>, record: &SkuRecord) {
    let Some(description) = &record.description else {
        return;
    };
    let too_long = description.chars().count() > MAX_DESCRIPTION_CHARS;
    let description = if too_long {
        let mut short: String =
            description.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
        short.push_str("...");
        short
    } else {
        description.clone()
    };
    lines.push(format!("    ℹ️  {description}"));
}

// Whole numbers keep one decimal, the way the dataset spells them.
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_descriptors() {
        let tools = tool_descriptors();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].required(), ["fat_value"]);
        assert_eq!(tools[1].required(), ["chocolate_type", "moulding_type"]);
    }

    #[test]
    fn test_fat_query() {
        let dataset = Dataset::sample();
        let output = call(
            &dataset,
            "query_skus_by_fat",
            args(json!({ "fat_value": 30, "operator": ">", "n": 10 })),
        );
        let text = output.render();
        assert!(text.starts_with("📊 Found 3 SKU(s) where Fat > 30g:\n"));
        assert_eq!(text.matches("  • **").count(), 3);
        assert!(text.contains("  • **CHD-N70-2512** (Fat: 42.5g)"));
        assert!(text.contains("  • **FIL-HZ-0042** (Fat: 31.0g)"));
        assert!(text.contains("    ℹ️  Cocoa: 70.5% | Origin: Ghana"));

        let text = call(
            &dataset,
            "query_skus_by_fat",
            args(json!({ "fat_value": 30, "operator": ">", "n": 1 })),
        )
        .render();
        assert!(text.starts_with("📊 Found 1 SKU(s)"));

        let text = call(
            &dataset,
            "query_skus_by_fat",
            args(json!({ "fat_value": 99.5 })),
        )
        .render();
        assert_eq!(text, "🔍 No SKUs found where Fat > 99.5g");
    }

    #[test]
    fn test_fat_query_bad_arguments() {
        let dataset = Dataset::sample();
        let text = call(
            &dataset,
            "query_skus_by_fat",
            args(json!({ "fat_value": 30, "operator": "!=" })),
        )
        .render();
        assert_eq!(text, "❌ Invalid operator: !=");

        let text =
            call(&dataset, "query_skus_by_fat", args(json!({}))).render();
        assert!(text.starts_with("❌ Error: "));
    }

    #[test]
    fn test_chocolate_query() {
        let dataset = Dataset::sample();
        let text = call(
            &dataset,
            "query_chocolate_products",
            args(json!({
                "chocolate_type": "Dark",
                "moulding_type": "callets",
                "n": 5
            })),
        )
        .render();
        assert_eq!(
            text,
            "🔍 No Dark chocolate products found with moulding type 'callets'"
        );

        let text = call(
            &dataset,
            "query_chocolate_products",
            args(json!({
                "chocolate_type": "White",
                "moulding_type": "CHIPS"
            })),
        )
        .render();
        assert!(text.starts_with(
            "🍫 Found 1 White chocolate product(s) with moulding type 'chips':"
        ));
        assert!(text.contains("    Base: White | Moulding: Chips"));

        // Compound products are not chocolate.
        let text = call(
            &dataset,
            "query_chocolate_products",
            args(json!({
                "chocolate_type": "Dark",
                "moulding_type": "drops"
            })),
        )
        .render();
        assert!(text.starts_with("🔍 No Dark chocolate products"));
    }

    #[test]
    fn test_unknown_tool() {
        let dataset = Dataset::sample();
        let text = call(&dataset, "drop_tables", Map::new()).render();
        assert_eq!(text, "❌ Unknown tool: drop_tables");
    }
}
