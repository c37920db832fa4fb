//! Page flattening - one upstream page body → catalog records
//!
//! The tariff service answers the codes listing in one of several shapes.
//! A page is classified once into a [`PageShape`] and each shape has its own
//! walk, so the contract per shape stays explicit:
//!
//! - `Tree`: nested nodes `{code, description, subgroup: [...]}` or a bare
//!   array of such nodes (flat rows are just leafless nodes)
//! - `Rows`: an envelope `{results: [...]}` / `{items: [...]}` of flat rows
//! - `JsonApi`: `{data: [{id, attributes}], links: {last: "...?page=N"}}`

use serde_json::{Map, Value};
use url::Url;

use super::index::CatalogRecord;

/// Joins ancestor descriptions in breadcrumb mode
pub const BREADCRUMB_SEPARATOR: &str = " > ";

const CODE_FIELDS: [&str; 3] = ["code", "goodsNomenclatureItemId", "nomenclatureCode"];
const DESCRIPTION_FIELDS: [&str; 2] = ["description", "formattedDescription"];
const CHILDREN_FIELD: &str = "subgroup";

/// Flattening switches
#[derive(Debug, Clone, Default)]
pub struct FlattenOptions {
    /// Prefix each description with its ancestors' descriptions
    pub breadcrumbs: bool,

    /// Requested locale, used to find `description_<lang>` style fields
    pub language: Option<String>,
}

/// Records found on one page plus the pagination hint it carried
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedPage {
    pub records: Vec<CatalogRecord>,

    /// Final page number announced by a JSON:API `links.last` URL
    pub last_page: Option<u32>,
}

/// Detected shape of a codes page
#[derive(Debug, Clone, PartialEq)]
pub enum PageShape<'a> {
    Tree(&'a Value),
    Rows(&'a [Value]),
    JsonApi {
        rows: &'a [Value],
        last_page: Option<u32>,
    },
    Empty,
}

impl<'a> PageShape<'a> {
    /// Classify a page body
    pub fn detect(body: &'a Value) -> Self {
        match body {
            Value::Array(_) => PageShape::Tree(body),
            Value::Object(map) => {
                if let Some(data) = map.get("data") {
                    let rows = match data {
                        Value::Array(rows) => rows.as_slice(),
                        Value::Object(_) => std::slice::from_ref(data),
                        _ => &[],
                    };
                    return PageShape::JsonApi {
                        rows,
                        last_page: last_page_hint(map),
                    };
                }

                for key in ["results", "items"] {
                    if let Some(Value::Array(rows)) = map.get(key) {
                        return PageShape::Rows(rows);
                    }
                }

                PageShape::Tree(body)
            }
            _ => PageShape::Empty,
        }
    }
}

/// Flatten one page body into catalog records
pub fn flatten_page(body: &Value, options: &FlattenOptions) -> FlattenedPage {
    let language = options.language.as_deref();
    let mut records = Vec::new();

    let last_page = match PageShape::detect(body) {
        PageShape::Tree(root) => {
            walk_tree(root, options.breadcrumbs, language, &mut records);
            None
        }
        PageShape::Rows(rows) => {
            records.extend(
                rows.iter()
                    .filter_map(Value::as_object)
                    .filter_map(|row| record_from(row, None, language)),
            );
            None
        }
        PageShape::JsonApi { rows, last_page } => {
            records.extend(rows.iter().filter_map(Value::as_object).filter_map(|row| {
                let id = row.get("id").and_then(scalar_text);
                match row.get("attributes").and_then(Value::as_object) {
                    Some(attributes) => record_from(attributes, id, language),
                    None => record_from(row, id, language),
                }
            }));
            last_page
        }
        PageShape::Empty => None,
    };

    FlattenedPage { records, last_page }
}

/// Collapse whitespace runs to one space and trim the ends
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Depth-first walk over `subgroup` children without recursion
///
/// `context` holds the descriptions of the current node's ancestors; each
/// stack frame remembers how much of it belongs to that frame, so siblings
/// truncate back to their shared prefix instead of copying it.
fn walk_tree(
    root: &Value,
    breadcrumbs: bool,
    language: Option<&str>,
    out: &mut Vec<CatalogRecord>,
) {
    let mut context: Vec<String> = Vec::new();
    let mut stack: Vec<(&Value, usize)> = vec![(root, 0)];

    while let Some((node, depth)) = stack.pop() {
        context.truncate(depth);

        match node {
            Value::Array(items) => {
                stack.extend(items.iter().rev().map(|item| (item, depth)));
            }
            Value::Object(map) => {
                let description = description_of(map, language);

                if let (Some(code), Some(own)) = (code_of(map, None), description.as_deref()) {
                    let description = if breadcrumbs && !context.is_empty() {
                        let mut path = context.join(BREADCRUMB_SEPARATOR);
                        path.push_str(BREADCRUMB_SEPARATOR);
                        path.push_str(own);
                        path
                    } else {
                        own.to_string()
                    };
                    out.push(CatalogRecord { code, description });
                }

                if let Some(description) = description {
                    context.push(description);
                }

                if let Some(children) = map.get(CHILDREN_FIELD) {
                    stack.push((children, context.len()));
                }
            }
            _ => {}
        }
    }
}

fn record_from(
    row: &Map<String, Value>,
    fallback_code: Option<String>,
    language: Option<&str>,
) -> Option<CatalogRecord> {
    let code = code_of(row, fallback_code)?;
    let description = description_of(row, language)?;
    Some(CatalogRecord { code, description })
}

fn code_of(map: &Map<String, Value>, fallback: Option<String>) -> Option<String> {
    CODE_FIELDS
        .iter()
        .find_map(|key| map.get(*key).and_then(scalar_text))
        .or(fallback)
}

fn description_of(map: &Map<String, Value>, language: Option<&str>) -> Option<String> {
    if let Some(found) = DESCRIPTION_FIELDS
        .iter()
        .find_map(|key| map.get(*key).and_then(scalar_text))
    {
        return Some(found);
    }

    let language = language?.trim();
    if language.is_empty() {
        return None;
    }

    let lower = language.to_ascii_lowercase();
    let mut capitalized = lower.clone();
    if let Some(first) = capitalized.get_mut(..1) {
        first.make_ascii_uppercase();
    }

    [
        format!("description_{lower}"),
        format!("description{capitalized}"),
        format!("description{}", language.to_ascii_uppercase()),
    ]
    .iter()
    .find_map(|key| map.get(key.as_str()).and_then(scalar_text))
}

/// Normalized text of a string or number field; blank counts as missing
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => normalize_text(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    (!text.is_empty()).then_some(text)
}

/// `page` query parameter of `links.last`, relative URLs included
fn last_page_hint(map: &Map<String, Value>) -> Option<u32> {
    let last = map.get("links")?.get("last")?.as_str()?;

    let url = Url::parse(last)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(last)))
        .ok()?;

    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod flatten_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn breadcrumbs() -> FlattenOptions {
        FlattenOptions {
            breadcrumbs: true,
            language: Some("PL".to_string()),
        }
    }

    fn plain() -> FlattenOptions {
        FlattenOptions {
            breadcrumbs: false,
            language: Some("PL".to_string()),
        }
    }

    fn pairs(page: &FlattenedPage) -> Vec<(&str, &str)> {
        page.records
            .iter()
            .map(|r| (r.code.as_str(), r.description.as_str()))
            .collect()
    }

    #[test]
    fn test_tree_with_breadcrumbs() {
        let body = json!({
            "description": "LIVE ANIMALS",
            "subgroup": [{"code": "0101", "description": "Horses"}]
        });

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(pairs(&page), vec![("0101", "LIVE ANIMALS > Horses")]);
        assert_eq!(page.last_page, None);
    }

    #[test]
    fn test_tree_without_breadcrumbs() {
        let body = json!({
            "description": "LIVE ANIMALS",
            "subgroup": [{"code": "0101", "description": "Horses"}]
        });

        let page = flatten_page(&body, &plain());
        assert_eq!(pairs(&page), vec![("0101", "Horses")]);
    }

    #[test]
    fn test_deep_tree_preorder_and_sibling_context() {
        let body = json!([
            {
                "description": "Section I",
                "subgroup": [
                    {
                        "code": "01",
                        "description": "Live animals",
                        "subgroup": [
                            {"code": "0101", "description": "Horses"},
                            {"code": "0102", "description": "Bovine"}
                        ]
                    },
                    {"code": "02", "description": "Meat"}
                ]
            },
            {"code": "03", "description": "Fish"}
        ]);

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(
            pairs(&page),
            vec![
                ("01", "Section I > Live animals"),
                ("0101", "Section I > Live animals > Horses"),
                ("0102", "Section I > Live animals > Bovine"),
                ("02", "Section I > Meat"),
                ("03", "Fish"),
            ]
        );
    }

    #[test]
    fn test_incomplete_nodes_emit_nothing_but_recurse() {
        let body = json!({
            "code": "01",
            "subgroup": [
                {
                    "code": "",
                    "description": "Horses, asses",
                    "subgroup": [{"code": "0101 21", "description": "Pure-bred"}]
                }
            ]
        });

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(pairs(&page), vec![("0101 21", "Horses, asses > Pure-bred")]);
    }

    #[test]
    fn test_blank_ancestor_descriptions_are_skipped() {
        let body = json!({
            "description": "   ",
            "subgroup": {"code": "0101", "description": "Horses"}
        });

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(pairs(&page), vec![("0101", "Horses")]);
    }

    #[test]
    fn test_whitespace_normalization() {
        let body = json!([{"code": " 0101 ", "description": "  Live\n   horses\t "}]);
        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(pairs(&page), vec![("0101", "Live horses")]);
    }

    #[test]
    fn test_flat_rows_with_field_variants() {
        let body = json!([
            {"goodsNomenclatureItemId": "0101210000", "formattedDescription": "Pure-bred horses"},
            {"nomenclatureCode": 102, "description": "Bovine"},
            {"code": "0103", "unrelated": true}
        ]);

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(
            pairs(&page),
            vec![("0101210000", "Pure-bred horses"), ("102", "Bovine")]
        );
    }

    #[test]
    fn test_locale_description_fields() {
        let body = json!({
            "results": [
                {"code": "0101", "description_pl": "Konie"},
                {"code": "0102", "descriptionPl": "Bydło"},
                {"code": "0103", "descriptionPL": "Świnie"},
                {"code": "0104", "description_en": "Sheep"}
            ]
        });

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(
            pairs(&page),
            vec![("0101", "Konie"), ("0102", "Bydło"), ("0103", "Świnie")]
        );
    }

    #[test]
    fn test_rows_envelope_ignores_subgroups() {
        let body = json!({
            "results": [
                {
                    "code": "0101",
                    "description": "Horses",
                    "subgroup": [{"code": "x", "description": "y"}]
                }
            ]
        });

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(pairs(&page), vec![("0101", "Horses")]);
    }

    #[test]
    fn test_json_api_envelope() {
        let body = json!({
            "data": [
                {"id": "0101000000", "type": "code", "attributes": {"description": "Horses"}},
                {
                    "id": "ignored",
                    "attributes": {
                        "goodsNomenclatureItemId": "0102000000",
                        "formattedDescription": "Bovine"
                    }
                },
                {"id": "0103000000", "attributes": {}}
            ],
            "links": {"last": "https://example.test/codes?date=2025-11-17&page=7"}
        });

        let page = flatten_page(&body, &breadcrumbs());
        assert_eq!(
            pairs(&page),
            vec![("0101000000", "Horses"), ("0102000000", "Bovine")]
        );
        assert_eq!(page.last_page, Some(7));
    }

    #[test]
    fn test_json_api_relative_last_link() {
        let body = json!({"data": [], "links": {"last": "/codes?page=12&language=PL"}});
        assert_eq!(
            PageShape::detect(&body),
            PageShape::JsonApi {
                rows: &[],
                last_page: Some(12)
            }
        );
    }

    #[test]
    fn test_shape_detection() {
        assert_eq!(PageShape::detect(&Value::Null), PageShape::Empty);
        assert_eq!(PageShape::detect(&json!("oops")), PageShape::Empty);

        let tree = json!({"description": "x"});
        assert_eq!(PageShape::detect(&tree), PageShape::Tree(&tree));

        let rows = json!({"items": [{"code": "1"}]});
        assert!(matches!(PageShape::detect(&rows), PageShape::Rows(r) if r.len() == 1));
    }

    #[test]
    fn test_empty_inputs_produce_nothing() {
        for body in [json!(null), json!([]), json!({}), json!({"results": []})] {
            assert!(flatten_page(&body, &breadcrumbs()).records.is_empty());
        }
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let mut node = json!({"code": "leaf", "description": "Leaf"});
        for level in 0..500 {
            node = json!({"description": format!("L{level}"), "subgroup": [node]});
        }

        let page = flatten_page(&node, &breadcrumbs());
        assert_eq!(page.records.len(), 1);
        assert!(page.records[0].description.starts_with("L499 > L498"));
        assert!(page.records[0].description.ends_with("L0 > Leaf"));
    }
}
