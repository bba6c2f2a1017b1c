//! Search requests and translation of parsed queries into tantivy queries

use crate::models::field::DEFAULT_SEARCH_FIELDS;
use crate::models::normalize_language;
use crate::search::error::SearchResult;
use crate::search::index::IndexSnapshot;
use crate::search::parser::{self, Clause, Occur, ParseResult, ParsedQuery, QueryNode, QueryParseError};
use crate::search::registry::FieldSet;
use serde::{Deserialize, Serialize};
use tantivy::query::{
    BooleanQuery, BoostQuery, ConstScoreQuery, EmptyQuery, PhrasePrefixQuery, PhraseQuery, Query,
    TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use tantivy::json_utils::JsonTermWriter;
use tantivy::Term;

const SCOPED_MARKER: &str = "PROP ";
const MULTI_MARKER: &str = "MULTI ";

/// One sort key; a leading `-` in its textual form means descending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// `None` for blank keys
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (field, descending) = match raw.strip_prefix('-') {
            Some(field) => (field.trim(), true),
            None => (raw, false),
        };
        if field.is_empty() {
            None
        } else {
            Some(Self {
                field: field.to_string(),
                descending,
            })
        }
    }
}

/// Search request against every configured index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query string, optionally prefixed by `PROP field:` or `MULTI`
    pub query: String,

    /// Sort keys in priority order, empty for relevance ranking
    pub sort: Vec<SortKey>,

    /// Accepted partitions (wikis), empty accepts all
    pub partitions: Vec<String>,

    /// Accepted languages, `""` meaning the default language
    pub languages: Vec<String>,

    /// Number of results to return
    pub limit: usize,

    /// Offset for pagination
    pub offset: usize,
}

fn split_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',').map(|item| item.trim().to_string())
}

impl SearchRequest {
    /// Create a new search request
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sort: Vec::new(),
            partitions: Vec::new(),
            languages: Vec::new(),
            limit: 20,
            offset: 0,
        }
    }

    /// Set sorting from textual keys such as `["-date", "title"]`
    pub fn with_sort<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sort = keys
            .into_iter()
            .filter_map(|key| SortKey::parse(key.as_ref()))
            .collect();
        self
    }

    pub fn with_partitions<I, S>(mut self, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partitions = partitions.into_iter().map(Into::into).collect();
        self
    }

    /// Comma separated partitions; blank entries are dropped
    pub fn with_partition_list(mut self, list: &str) -> Self {
        self.partitions = split_list(list).filter(|p| !p.is_empty()).collect();
        self
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Comma separated languages; a blank entry selects the default language
    pub fn with_language_list(mut self, list: &str) -> Self {
        self.languages = if list.trim().is_empty() {
            Vec::new()
        } else {
            split_list(list).collect()
        };
        self
    }

    /// Set limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Which fields unscoped terms are searched in
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTarget {
    /// `PROP field: expr`
    Scoped(String),
    /// `MULTI expr`: every field ever committed
    Multi,
    /// The default text fields
    Default,
}

/// Parsed form of a request's query string, independent of any index
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub target: QueryTarget,
    pub parsed: ParsedQuery,
}

impl QueryPlan {
    pub fn parse(query: &str) -> ParseResult<Self> {
        if let Some(rest) = query.strip_prefix(SCOPED_MARKER) {
            let (field, expr) = rest
                .split_once(':')
                .ok_or(QueryParseError::MissingScopedField)?;
            let field = field.trim();
            if field.is_empty() || field.contains(char::is_whitespace) {
                return Err(QueryParseError::MissingScopedField);
            }
            return Ok(Self {
                target: QueryTarget::Scoped(field.to_string()),
                parsed: parser::parse_query(expr)?,
            });
        }

        if let Some(expr) = query.strip_prefix(MULTI_MARKER) {
            return Ok(Self {
                target: QueryTarget::Multi,
                parsed: parser::parse_query(expr)?,
            });
        }

        Ok(Self {
            target: QueryTarget::Default,
            parsed: parser::parse_query(query)?,
        })
    }
}

enum Target {
    Fixed { field: Field, tokenized: bool },
    Dynamic { path: String },
}

/// Builds tantivy queries for one index snapshot
pub struct QueryBuilder<'a> {
    snapshot: &'a IndexSnapshot,
    registry: &'a FieldSet,
    analyzer: TextAnalyzer,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(snapshot: &'a IndexSnapshot, registry: &'a FieldSet) -> SearchResult<Self> {
        Ok(Self {
            snapshot,
            registry,
            analyzer: snapshot.analyzer()?,
        })
    }

    /// Text query conjoined with the partition and language filters
    pub fn build(&mut self, plan: &QueryPlan, request: &SearchRequest) -> Box<dyn Query> {
        let default_fields: Vec<String> = match &plan.target {
            QueryTarget::Scoped(field) => vec![field.clone()],
            QueryTarget::Multi => self.registry.names().map(str::to_string).collect(),
            QueryTarget::Default => DEFAULT_SEARCH_FIELDS.iter().map(|f| f.to_string()).collect(),
        };

        let mut text_query = self
            .clauses(&plan.parsed.clauses, &default_fields)
            .unwrap_or_else(|| Box::new(EmptyQuery));

        if !matches!(plan.target, QueryTarget::Scoped(_)) {
            // OR over many fields averages scores down; scale back by the field count
            let boost = default_fields.len().max(1) as f32;
            text_query = Box::new(BoostQuery::new(text_query, boost));
        }

        let mut conjunction: Vec<(tantivy::query::Occur, Box<dyn Query>)> =
            vec![(tantivy::query::Occur::Must, text_query)];

        let fields = self.snapshot.fields();
        if !request.partitions.is_empty() {
            conjunction.push((
                tantivy::query::Occur::Must,
                any_of(fields.wiki, request.partitions.iter().map(String::as_str)),
            ));
        }
        if !request.languages.is_empty() {
            conjunction.push((
                tantivy::query::Occur::Must,
                any_of(
                    fields.lang,
                    request.languages.iter().map(|l| normalize_language(l.trim())),
                ),
            ));
        }

        if conjunction.len() == 1 {
            conjunction.remove(0).1
        } else {
            Box::new(BooleanQuery::new(conjunction))
        }
    }

    fn clauses(&mut self, clauses: &[Clause], default_fields: &[String]) -> Option<Box<dyn Query>> {
        let mut subqueries: Vec<(tantivy::query::Occur, Box<dyn Query>)> = Vec::new();

        for clause in clauses {
            let Some(mut query) = self.node(&clause.node, default_fields) else {
                continue;
            };
            if let Some(boost) = clause.boost {
                query = Box::new(BoostQuery::new(query, boost));
            }
            let occur = match clause.occur {
                Occur::Should => tantivy::query::Occur::Should,
                Occur::Must => tantivy::query::Occur::Must,
                Occur::MustNot => tantivy::query::Occur::MustNot,
            };
            subqueries.push((occur, query));
        }

        match subqueries.len() {
            0 => None,
            1 if subqueries[0].0 != tantivy::query::Occur::MustNot => {
                subqueries.pop().map(|(_, query)| query)
            }
            _ => Some(Box::new(BooleanQuery::new(subqueries))),
        }
    }

    fn node(&mut self, node: &QueryNode, default_fields: &[String]) -> Option<Box<dyn Query>> {
        let (field, text) = match node {
            QueryNode::Group { clauses } => return self.clauses(clauses, default_fields),
            QueryNode::Term { field, text }
            | QueryNode::Prefix { field, text }
            | QueryNode::Phrase { field, text } => (field, text),
        };

        let names: Vec<&str> = match field {
            Some(field) => vec![field.as_str()],
            None => default_fields.iter().map(String::as_str).collect(),
        };

        let prefix = matches!(node, QueryNode::Prefix { .. });
        let mut per_field: Vec<(tantivy::query::Occur, Box<dyn Query>)> = Vec::new();
        for name in names {
            if let Some(query) = self.field_query(name, text, prefix) {
                let boost = self.registry.boost(name);
                let query: Box<dyn Query> = if (boost - 1.0).abs() > f32::EPSILON {
                    Box::new(BoostQuery::new(query, boost))
                } else {
                    query
                };
                per_field.push((tantivy::query::Occur::Should, query));
            }
        }

        match per_field.len() {
            0 => None,
            1 => per_field.pop().map(|(_, query)| query),
            _ => Some(Box::new(BooleanQuery::new(per_field))),
        }
    }

    fn resolve(&self, name: &str) -> Target {
        let fields = self.snapshot.fields();
        match fields.fixed_field(name) {
            Some(field) => Target::Fixed {
                field,
                tokenized: fields.is_tokenized(name),
            },
            None => Target::Dynamic {
                path: name.to_string(),
            },
        }
    }

    fn field_query(&mut self, name: &str, text: &str, prefix: bool) -> Option<Box<dyn Query>> {
        match self.resolve(name) {
            Target::Fixed {
                field,
                tokenized: true,
            } => {
                let terms = self
                    .tokens(text)
                    .into_iter()
                    .map(|token| Term::from_field_text(field, &token))
                    .collect();
                terms_query(terms, prefix)
            }
            Target::Fixed {
                field,
                tokenized: false,
            } => terms_query(vec![Term::from_field_text(field, text)], prefix),
            Target::Dynamic { path } => {
                let fields = self.snapshot.fields();
                let (props, props_raw) = (fields.props, fields.props_raw);

                let analyzed = self
                    .tokens(text)
                    .into_iter()
                    .map(|token| json_term(props, &path, &token))
                    .collect();
                let exact = vec![json_term(props_raw, &path, text)];

                let alternatives: Vec<(tantivy::query::Occur, Box<dyn Query>)> =
                    [terms_query(analyzed, prefix), terms_query(exact, prefix)]
                        .into_iter()
                        .flatten()
                        .map(|query| (tantivy::query::Occur::Should, query))
                        .collect();

                match alternatives.len() {
                    0 => None,
                    _ => Some(Box::new(BooleanQuery::new(alternatives))),
                }
            }
        }
    }

    fn tokens(&mut self, text: &str) -> Vec<String> {
        let mut stream = self.analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while let Some(token) = stream.next() {
            tokens.push(token.text.clone());
        }
        tokens
    }
}

/// Term for `value` under the dotted `path` of a JSON field
fn json_term(field: Field, path: &str, value: &str) -> Term {
    let mut term = Term::with_capacity(path.len() + value.len() + 8);
    JsonTermWriter::from_field_and_json_path(field, path, true, &mut term).set_str(value);
    term
}

/// No term: nothing to match. One term: term or prefix query. More: phrase.
fn terms_query(mut terms: Vec<Term>, prefix: bool) -> Option<Box<dyn Query>> {
    match (terms.len(), prefix) {
        (0, _) => None,
        (_, true) => Some(Box::new(PhrasePrefixQuery::new(terms))),
        (1, false) => terms
            .pop()
            .map(|term| Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>),
        (_, false) => Some(Box::new(PhraseQuery::new(terms))),
    }
}

/// Non-scoring disjunction of exact values
fn any_of<'v>(field: Field, values: impl Iterator<Item = &'v str>) -> Box<dyn Query> {
    let alternatives: Vec<(tantivy::query::Occur, Box<dyn Query>)> = values
        .map(|value| {
            let query: Box<dyn Query> = Box::new(TermQuery::new(
                Term::from_field_text(field, value),
                IndexRecordOption::Basic,
            ));
            (tantivy::query::Occur::Should, query)
        })
        .collect();

    Box::new(ConstScoreQuery::new(Box::new(BooleanQuery::new(alternatives)), 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!(
            SortKey::parse("-date"),
            Some(SortKey {
                field: "date".into(),
                descending: true
            })
        );
        assert_eq!(SortKey::parse("title").map(|k| k.descending), Some(false));
        assert_eq!(SortKey::parse("  "), None);
        assert_eq!(SortKey::parse("-"), None);
    }

    #[test]
    fn test_request_builder() {
        let request = SearchRequest::new("hello")
            .with_sort(["-date", "", "title"])
            .with_partition_list("wikiA, wikiB,")
            .with_language_list("en,")
            .with_limit(5)
            .with_offset(10);

        assert_eq!(request.sort.len(), 2);
        assert_eq!(request.partitions, vec!["wikiA", "wikiB"]);
        assert_eq!(request.languages, vec!["en", ""]);
        assert_eq!(request.limit, 5);
        assert_eq!(request.offset, 10);
    }

    #[test]
    fn test_query_plan_markers() {
        let plan = QueryPlan::parse("PROP XWiki.User.name: Ada").unwrap();
        assert_eq!(plan.target, QueryTarget::Scoped("XWiki.User.name".into()));

        let plan = QueryPlan::parse("MULTI Hello").unwrap();
        assert_eq!(plan.target, QueryTarget::Multi);

        let plan = QueryPlan::parse("Hello world").unwrap();
        assert_eq!(plan.target, QueryTarget::Default);
        assert_eq!(plan.parsed.clauses.len(), 2);

        assert_eq!(
            QueryPlan::parse("PROP no field here"),
            Err(QueryParseError::MissingScopedField)
        );
        assert_eq!(QueryPlan::parse("MULTI "), Err(QueryParseError::Empty));
    }

    #[test]
    fn test_json_terms_address_indexed_properties() {
        use crate::models::{FieldWeight, IndexField};
        use crate::search::config::AnalyzerKind;
        use crate::search::document::{build_analyzer, build_wiki_schema, IndexFields, TEXT_TOKENIZER};
        use tantivy::collector::Count;

        let fields = IndexFields::new(build_wiki_schema()).unwrap();
        let index = tantivy::Index::create_in_ram(fields.schema().clone());
        index
            .tokenizers()
            .register(TEXT_TOKENIZER, build_analyzer(AnalyzerKind::Standard));

        let mut writer: tantivy::IndexWriter = index.writer(15_000_000).unwrap();
        writer
            .add_document(fields.to_document(&[
                IndexField::keyword("Blog.BlogPostClass.category", "Blog.News"),
                IndexField::text("Blog.BlogPostClass.summary", "Quarterly roadmap", FieldWeight::Property),
            ]))
            .unwrap();
        writer.commit().unwrap();
        let searcher = index.reader().unwrap().searcher();

        let count = |term: Term| {
            searcher
                .search(&TermQuery::new(term, IndexRecordOption::Basic), &Count)
                .unwrap()
        };
        assert_eq!(count(json_term(fields.props_raw, "Blog.BlogPostClass.category", "Blog.News")), 1);
        assert_eq!(count(json_term(fields.props, "Blog.BlogPostClass.summary", "roadmap")), 1);
        assert_eq!(count(json_term(fields.props_raw, "Blog.BlogPostClass.summary", "roadmap")), 0);
        assert_eq!(count(json_term(fields.props_raw, "Blog.OtherClass.category", "Blog.News")), 0);
    }
}
