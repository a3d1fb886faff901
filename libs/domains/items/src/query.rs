//! Typed query descriptor and builder for item listings
//!
//! Raw `key=value` parameters are parsed once at the boundary into
//! [`ItemQueryParams`]; only the keys in [`QueryKey`] are accepted. The
//! [`QueryBuilder`] then layers filter, search, sort, pagination and field
//! projection stages into an executable [`ItemQuery`] that both repository
//! backends understand.

use chrono::{DateTime, Days, NaiveDate, Utc};
use field_selector::Projection;
use std::cmp::Ordering;
use std::str::FromStr;
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::error::{ItemError, ItemResult};
use crate::models::{Item, ItemDetails, ItemStatus};

/// Fields matched by the free-text `search_term` parameter
pub const ITEM_SEARCHABLE_FIELDS: &[&str] = &["title", "description", "location"];

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// Recognized query-string keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QueryKey {
    #[strum(to_string = "search_term", serialize = "searchTerm")]
    SearchTerm,
    Sort,
    Page,
    Limit,
    Fields,
    /// Owner, by id or email
    User,
    /// Category, by id or name
    Category,
    #[strum(to_string = "date_range", serialize = "dateRange")]
    DateRange,
    Status,
    Location,
}

/// Sortable item fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Price,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    /// Parse a comma list such as `-price,title`
    pub fn parse_list(raw: &str) -> ItemResult<Vec<Self>> {
        let specs = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|token| {
                let (direction, name) = match token.strip_prefix('-') {
                    Some(name) => (SortDirection::Desc, name),
                    None => (SortDirection::Asc, token),
                };
                let field = SortField::from_str(name).map_err(|_| {
                    ItemError::Validation(format!("Cannot sort by unknown field '{name}'"))
                })?;
                Ok(Self { field, direction })
            })
            .collect::<ItemResult<Vec<_>>>()?;

        if specs.is_empty() {
            Ok(default_sort())
        } else {
            Ok(specs)
        }
    }
}

fn default_sort() -> Vec<SortSpec> {
    vec![SortSpec::desc(SortField::CreatedAt)]
}

/// Owner reference as supplied by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(Uuid),
    Email(String),
    /// A reference that was looked up and matched no user
    Unresolved,
}

impl UserRef {
    /// Anything that is not a user id is looked up as an email
    fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw) {
            Ok(id) => UserRef::Id(id),
            Err(_) => UserRef::Email(raw.to_string()),
        }
    }
}

/// Category reference as supplied by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Id(Uuid),
    Name(String),
    Unresolved,
}

impl CategoryRef {
    fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw) {
            Ok(id) => CategoryRef::Id(id),
            Err(_) => CategoryRef::Name(raw.to_string()),
        }
    }
}

/// Inclusive calendar-day range, `YYYY-MM-DD,YYYY-MM-DD`; either side may be open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(raw: &str) -> ItemResult<Option<Self>> {
        let (from, to) = raw.split_once(',').ok_or_else(|| {
            ItemError::Validation(format!(
                "'date_range' must look like YYYY-MM-DD,YYYY-MM-DD, got '{raw}'"
            ))
        })?;

        let parse_day = |s: &str| -> ItemResult<Option<NaiveDate>> {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| ItemError::Validation(format!("Invalid date '{s}' in 'date_range'")))
        };

        let range = Self {
            from: parse_day(from)?,
            to: parse_day(to)?,
        };

        match (range.from, range.to) {
            (None, None) => Ok(None),
            (Some(from), Some(to)) if from > to => Err(ItemError::Validation(format!(
                "'date_range' starts after it ends ({from} > {to})"
            ))),
            _ => Ok(Some(range)),
        }
    }

    /// Half-open creation window covering the whole of both days
    pub fn window(&self) -> CreatedWindow {
        CreatedWindow {
            from: self.from.map(start_of_day),
            until: self
                .to
                .and_then(|to| to.checked_add_days(Days::new(1)))
                .map(start_of_day),
        }
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// `from <= created_at < until`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreatedWindow {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CreatedWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.until.is_none_or(|until| at < until)
    }
}

/// Validated listing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQueryParams {
    pub search_term: Option<String>,
    pub sort: Vec<SortSpec>,
    pub page: u64,
    pub limit: u64,
    pub fields: Option<Projection>,
    pub user: Option<UserRef>,
    pub category: Option<CategoryRef>,
    pub date_range: Option<DateRange>,
    /// Set by the date-range rewrite
    pub created: Option<CreatedWindow>,
    pub status: Option<ItemStatus>,
    pub location: Option<String>,
}

impl Default for ItemQueryParams {
    fn default() -> Self {
        Self {
            search_term: None,
            sort: default_sort(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            fields: None,
            user: None,
            category: None,
            date_range: None,
            created: None,
            status: None,
            location: None,
        }
    }
}

impl ItemQueryParams {
    /// Parse raw query-string pairs
    ///
    /// Unknown keys and malformed values are rejected. Blank values count as
    /// absent; a repeated key keeps its last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> ItemResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            let key = QueryKey::from_str(key)
                .map_err(|_| ItemError::Validation(format!("Unknown query parameter '{key}'")))?;

            if value.is_empty() {
                continue;
            }

            match key {
                QueryKey::SearchTerm => params.search_term = Some(value.to_string()),
                QueryKey::Sort => params.sort = SortSpec::parse_list(value)?,
                QueryKey::Page => {
                    params.page = parse_number(key, value)?;
                    if params.page == 0 {
                        return Err(ItemError::Validation("'page' starts at 1".to_string()));
                    }
                }
                QueryKey::Limit => {
                    params.limit = parse_number(key, value)?;
                    if !(1..=MAX_LIMIT).contains(&params.limit) {
                        return Err(ItemError::Validation(format!(
                            "'limit' must be between 1 and {MAX_LIMIT}"
                        )));
                    }
                }
                QueryKey::Fields => {
                    params.fields = Projection::parse(value)?;
                    if let Some(projection) = &params.fields {
                        projection.validate::<ItemDetails>()?;
                    }
                }
                QueryKey::User => params.user = Some(UserRef::parse(value)),
                QueryKey::Category => params.category = Some(CategoryRef::parse(value)),
                QueryKey::DateRange => params.date_range = DateRange::parse(value)?,
                QueryKey::Status => {
                    params.status = Some(ItemStatus::from_str(value).map_err(|_| {
                        ItemError::Validation(format!("Unknown item status '{value}'"))
                    })?)
                }
                QueryKey::Location => params.location = Some(value.to_string()),
            }
        }

        if params.skip().is_none() {
            return Err(ItemError::Validation(format!(
                "'page' {} is out of range for limit {}",
                params.page, params.limit
            )));
        }

        Ok(params)
    }

    /// Number of items before the requested page, if it fits a MongoDB skip
    pub fn skip(&self) -> Option<u64> {
        self.page
            .checked_sub(1)?
            .checked_mul(self.limit)
            .filter(|skip| *skip <= i64::MAX as u64)
    }
}

fn parse_number(key: QueryKey, value: &str) -> ItemResult<u64> {
    value
        .parse()
        .map_err(|_| ItemError::Validation(format!("'{key}' must be a positive integer")))
}

/// Predicates an item must satisfy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub user: Option<Uuid>,
    pub category: Option<Uuid>,
    pub status: Option<ItemStatus>,
    /// Exact location, case-insensitive
    pub location: Option<String>,
    pub created: Option<CreatedWindow>,
    /// A reference could not be resolved; nothing can match
    pub none_match: bool,
}

impl ItemFilter {
    pub fn owned_by(user: Uuid) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        !self.none_match
            && self.user.is_none_or(|user| item.user == user)
            && self.category.is_none_or(|category| item.category == category)
            && self.status.is_none_or(|status| item.status == status)
            && self.location.as_ref().is_none_or(|location| {
                item.location
                    .as_ref()
                    .is_some_and(|l| l.to_lowercase() == location.to_lowercase())
            })
            && self
                .created
                .is_none_or(|window| window.contains(item.created_at))
    }
}

/// Case-insensitive substring match over a set of fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchClause {
    pub term: String,
    pub fields: Vec<&'static str>,
}

impl SearchClause {
    pub fn matches(&self, item: &Item) -> bool {
        let needle = self.term.to_lowercase();
        self.fields.iter().any(|field| {
            let haystack = match *field {
                "title" => Some(item.title.as_str()),
                "description" => Some(item.description.as_str()),
                "location" => item.location.as_deref(),
                _ => None,
            };
            haystack.is_some_and(|h| h.to_lowercase().contains(&needle))
        })
    }
}

/// `skip`/`limit` window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: u64,
    pub limit: u64,
}

/// Executable listing query
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    pub filter: ItemFilter,
    pub search: Option<SearchClause>,
    pub sort: Vec<SortSpec>,
    pub window: Option<PageWindow>,
    pub projection: Option<Projection>,
}

impl ItemQuery {
    pub fn matches(&self, item: &Item) -> bool {
        self.filter.matches(item) && self.search.as_ref().is_none_or(|s| s.matches(item))
    }

    /// Order two items by the sort keys, then by id
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        self.sort
            .iter()
            .map(|spec| {
                let ord = match spec.field {
                    SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                    SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                    SortField::Title => a.title.cmp(&b.title),
                    // missing prices sort first, as null does in MongoDB
                    SortField::Price => match (a.price, b.price) {
                        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                        (None, Some(_)) => Ordering::Less,
                        (Some(_), None) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    },
                };
                match spec.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }
}

/// Builds an [`ItemQuery`] from a base filter and client parameters
///
/// Stages are applied in call order; a stage that is never called leaves its
/// part of the query empty.
///
/// ```
/// use domain_items::query::{ItemFilter, ItemQueryParams, QueryBuilder, ITEM_SEARCHABLE_FIELDS};
///
/// let params = ItemQueryParams::from_pairs([("searchTerm", "bike"), ("page", "2")]).unwrap();
/// let query = QueryBuilder::new(ItemFilter::default(), params)
///     .filter()
///     .search(ITEM_SEARCHABLE_FIELDS)
///     .sort()
///     .paginate()
///     .fields()
///     .build();
///
/// assert_eq!(query.window.unwrap().skip, 10);
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    params: ItemQueryParams,
    query: ItemQuery,
}

impl QueryBuilder {
    pub fn new(base: ItemFilter, params: ItemQueryParams) -> Self {
        Self {
            params,
            query: ItemQuery {
                filter: base,
                search: None,
                sort: Vec::new(),
                window: None,
                projection: None,
            },
        }
    }

    /// Narrow the base filter with the parameter predicates
    ///
    /// Values already present in the base filter win. Textual references
    /// that were not resolved to ids make the query unsatisfiable.
    pub fn filter(mut self) -> Self {
        let params = &self.params;
        let filter = &mut self.query.filter;

        if filter.user.is_none() {
            match &params.user {
                Some(UserRef::Id(id)) => filter.user = Some(*id),
                Some(UserRef::Email(_) | UserRef::Unresolved) => filter.none_match = true,
                None => {}
            }
        }
        if filter.category.is_none() {
            match &params.category {
                Some(CategoryRef::Id(id)) => filter.category = Some(*id),
                Some(CategoryRef::Name(_) | CategoryRef::Unresolved) => filter.none_match = true,
                None => {}
            }
        }
        if filter.created.is_none() {
            filter.created = params
                .created
                .or_else(|| params.date_range.map(|range| range.window()));
        }
        if filter.status.is_none() {
            filter.status = params.status;
        }
        if filter.location.is_none() {
            filter.location = params.location.clone();
        }
        self
    }

    pub fn search(mut self, fields: &[&'static str]) -> Self {
        self.query.search = self.params.search_term.clone().map(|term| SearchClause {
            term,
            fields: fields.to_vec(),
        });
        self
    }

    pub fn sort(mut self) -> Self {
        self.query.sort = self.params.sort.clone();
        self
    }

    pub fn paginate(mut self) -> Self {
        self.query.window = Some(PageWindow {
            skip: self.params.skip().unwrap_or(i64::MAX as u64),
            limit: self.params.limit,
        });
        self
    }

    pub fn fields(mut self) -> Self {
        self.query.projection = self.params.fields.clone();
        self
    }

    pub fn build(self) -> ItemQuery {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateItem;

    fn item(title: &str, price: Option<f64>) -> Item {
        Item::new(CreateItem {
            user: Uuid::now_v7(),
            category: Uuid::now_v7(),
            title: title.to_string(),
            description: String::new(),
            price,
            location: Some("Porto".to_string()),
            status: ItemStatus::Available,
            attributes: serde_json::Value::Null,
            images: vec![],
        })
    }

    #[test]
    fn test_defaults() {
        let params = ItemQueryParams::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 10);
        assert_eq!(params.sort, vec![SortSpec::desc(SortField::CreatedAt)]);
    }

    #[test]
    fn test_camel_case_aliases() {
        let params =
            ItemQueryParams::from_pairs([("searchTerm", "bike"), ("dateRange", "2024-01-01,")])
                .unwrap();
        assert_eq!(params.search_term.as_deref(), Some("bike"));
        assert!(params.date_range.is_some());
        assert_eq!(QueryKey::SearchTerm.to_string(), "search_term");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = ItemQueryParams::from_pairs([("colour", "red")]).unwrap_err();
        assert!(matches!(err, ItemError::Validation(msg) if msg.contains("colour")));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        for (key, value) in [
            ("page", "0"),
            ("page", "two"),
            ("limit", "500"),
            ("sort", "-colour"),
            ("status", "lost"),
            ("date_range", "2024-01-01"),
            ("date_range", "2024-02-01,2024-01-01"),
            ("fields", "title,-price"),
            ("fields", "secret"),
        ] {
            assert!(
                ItemQueryParams::from_pairs([(key, value)]).is_err(),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_page_beyond_skip_range_is_rejected() {
        let err = ItemQueryParams::from_pairs([("page", "18446744073709551615")]).unwrap_err();
        assert!(matches!(err, ItemError::Validation(msg) if msg.contains("page")));

        let err =
            ItemQueryParams::from_pairs([("page", "92233720368547760"), ("limit", "100")])
                .unwrap_err();
        assert!(matches!(err, ItemError::Validation(_)));

        let err = ItemQueryParams::from_pairs([("page", "9223372036854775808")]).unwrap_err();
        assert!(matches!(err, ItemError::Validation(_)));
    }

    #[test]
    fn test_large_page_within_range_paginates() {
        let params =
            ItemQueryParams::from_pairs([("page", "922337203685477580"), ("limit", "10")])
                .unwrap();
        let query = QueryBuilder::new(ItemFilter::default(), params)
            .paginate()
            .build();
        assert_eq!(
            query.window,
            Some(PageWindow {
                skip: 9_223_372_036_854_775_790,
                limit: 10
            })
        );
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let params = ItemQueryParams::from_pairs([("user", " "), ("sort", "")]).unwrap();
        assert_eq!(params, ItemQueryParams::default());
    }

    #[test]
    fn test_sort_list() {
        let specs = SortSpec::parse_list("-price,title").unwrap();
        assert_eq!(
            specs,
            vec![SortSpec::desc(SortField::Price), SortSpec::asc(SortField::Title)]
        );
    }

    #[test]
    fn test_references_parse_by_shape() {
        let id = Uuid::now_v7();
        let params = ItemQueryParams::from_pairs([
            ("user", "ana@example.com".to_string()),
            ("category", id.to_string()),
        ])
        .unwrap();
        assert_eq!(params.user, Some(UserRef::Email("ana@example.com".into())));
        assert_eq!(params.category, Some(CategoryRef::Id(id)));

        let params = ItemQueryParams::from_pairs([("category", "Bikes")]).unwrap();
        assert_eq!(params.category, Some(CategoryRef::Name("Bikes".into())));

        let params = ItemQueryParams::from_pairs([("user", "ana")]).unwrap();
        assert_eq!(params.user, Some(UserRef::Email("ana".into())));
    }

    #[test]
    fn test_date_range_window_is_inclusive_of_both_days() {
        let range = DateRange::parse("2024-03-01,2024-03-02").unwrap().unwrap();
        let window = range.window();

        let at = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);
        assert!(window.contains(at("2024-03-01T00:00:00Z")));
        assert!(window.contains(at("2024-03-02T23:59:59Z")));
        assert!(!window.contains(at("2024-03-03T00:00:00Z")));
        assert!(!window.contains(at("2024-02-29T23:59:59Z")));

        let open = DateRange::parse(",2024-03-02").unwrap().unwrap().window();
        assert!(open.from.is_none());
        assert!(DateRange::parse(",").unwrap().is_none());
    }

    #[test]
    fn test_builder_stages() {
        let params = ItemQueryParams::from_pairs([
            ("searchTerm", "bike"),
            ("page", "3"),
            ("limit", "20"),
            ("fields", "title,price"),
            ("status", "sold"),
        ])
        .unwrap();

        let query = QueryBuilder::new(ItemFilter::default(), params.clone())
            .filter()
            .search(ITEM_SEARCHABLE_FIELDS)
            .sort()
            .paginate()
            .fields()
            .build();

        assert_eq!(query.filter.status, Some(ItemStatus::Sold));
        assert_eq!(query.search.as_ref().unwrap().fields, ITEM_SEARCHABLE_FIELDS);
        assert_eq!(query.window, Some(PageWindow { skip: 40, limit: 20 }));
        assert!(query.projection.is_some());

        let unpaged = QueryBuilder::new(ItemFilter::default(), params)
            .filter()
            .sort()
            .build();
        assert!(unpaged.window.is_none());
        assert!(unpaged.search.is_none());
    }

    #[test]
    fn test_base_filter_wins_over_client_owner() {
        let owner = Uuid::now_v7();
        let params =
            ItemQueryParams::from_pairs([("user", Uuid::now_v7().to_string())]).unwrap();

        let query = QueryBuilder::new(ItemFilter::owned_by(owner), params)
            .filter()
            .build();
        assert_eq!(query.filter.user, Some(owner));
    }

    #[test]
    fn test_unresolved_reference_matches_nothing() {
        let params = ItemQueryParams::from_pairs([("category", "Bikes")]).unwrap();
        let query = QueryBuilder::new(ItemFilter::default(), params)
            .filter()
            .build();

        assert!(query.filter.none_match);
        assert!(!query.matches(&item("Road bike", None)));
    }

    #[test]
    fn test_search_clause_is_case_insensitive() {
        let clause = SearchClause {
            term: "BIKE".to_string(),
            fields: ITEM_SEARCHABLE_FIELDS.to_vec(),
        };
        assert!(clause.matches(&item("Road bike", None)));
        assert!(!clause.matches(&item("Desk lamp", None)));

        let by_location = SearchClause {
            term: "port".to_string(),
            fields: vec!["location"],
        };
        assert!(by_location.matches(&item("Desk lamp", None)));
    }

    #[test]
    fn test_compare_by_price_puts_missing_first() {
        let query = QueryBuilder::new(
            ItemFilter::default(),
            ItemQueryParams::from_pairs([("sort", "price")]).unwrap(),
        )
        .sort()
        .build();

        let mut items = vec![item("b", Some(20.0)), item("a", None), item("c", Some(5.0))];
        items.sort_by(|a, b| query.compare(a, b));
        let prices: Vec<_> = items.iter().map(|i| i.price).collect();
        assert_eq!(prices, vec![None, Some(5.0), Some(20.0)]);
    }
}
