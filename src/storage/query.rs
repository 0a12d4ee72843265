//! Structural filters and sort options over file records.

use std::cmp::Ordering;

use serde_json::Value;

use crate::{FileId, FileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub path: String,
    pub op: Op,
    pub value: Value,
}

/// Conjunction of clauses; the empty filter matches every record.
///
/// Paths use the stored field names (`_id`, `filename`, `length`, `chunkSize`,
/// `uploadDate`, `contentType`) or dotted paths into metadata such as
/// `metadata.uuid`. `uploadDate` compares as microseconds since the epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &FileId) -> Self {
        Self::new().eq("_id", id.to_string())
    }

    pub fn by_filename(filename: &str) -> Self {
        Self::new().eq("filename", filename)
    }

    pub fn and(mut self, path: &str, op: Op, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause {
            path: path.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, path: &str, value: impl Into<Value>) -> Self {
        self.and(path, Op::Eq, value)
    }

    pub fn ne(self, path: &str, value: impl Into<Value>) -> Self {
        self.and(path, Op::Ne, value)
    }

    pub fn gt(self, path: &str, value: impl Into<Value>) -> Self {
        self.and(path, Op::Gt, value)
    }

    pub fn gte(self, path: &str, value: impl Into<Value>) -> Self {
        self.and(path, Op::Gte, value)
    }

    pub fn lt(self, path: &str, value: impl Into<Value>) -> Self {
        self.and(path, Op::Lt, value)
    }

    pub fn lte(self, path: &str, value: impl Into<Value>) -> Self {
        self.and(path, Op::Lte, value)
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// The id this filter pins down with an equality clause, if any.
    pub fn id_eq(&self) -> Option<FileId> {
        self.clauses
            .iter()
            .find(|c| c.path == "_id" && c.op == Op::Eq)
            .and_then(|c| c.value.as_str())
            .and_then(|s| s.parse().ok())
    }

    pub fn matches(&self, record: &FileRecord) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        let Ok(doc) = serde_json::to_value(record) else {
            return false;
        };
        self.matches_value(&doc)
    }

    fn matches_value(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| {
            let field = lookup(doc, &clause.path);
            let ordering = || field.and_then(|f| compare_values(f, &clause.value));
            match clause.op {
                Op::Eq => field.is_some_and(|f| values_equal(f, &clause.value)),
                Op::Ne => !field.is_some_and(|f| values_equal(f, &clause.value)),
                Op::Gt => ordering() == Some(Ordering::Greater),
                Op::Gte => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
                Op::Lt => ordering() == Some(Ordering::Less),
                Op::Lte => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sort_by(mut self, path: &str, order: SortOrder) -> Self {
        self.sort.push((path.to_string(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Results of a `find`, yielded in the requested order.
#[derive(Debug)]
pub struct Cursor {
    records: std::vec::IntoIter<FileRecord>,
}

impl Cursor {
    pub fn new(records: Vec<FileRecord>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl Iterator for Cursor {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// Filter, sort and page an arbitrary record source.
///
/// Backends without native query support funnel their scans through here.
pub fn apply<I>(records: I, filter: &Filter, options: &FindOptions) -> Vec<FileRecord>
where
    I: IntoIterator<Item = FileRecord>,
{
    let mut matched: Vec<(Value, FileRecord)> = records
        .into_iter()
        .filter_map(|record| {
            let doc = serde_json::to_value(&record).ok()?;
            filter.matches_value(&doc).then_some((doc, record))
        })
        .collect();

    if !options.sort.is_empty() {
        matched.sort_by(|(a, _), (b, _)| {
            for (path, order) in &options.sort {
                let ord = match (lookup(a, path), lookup(b, path)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                let ord = match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let iter = matched.into_iter().map(|(_, record)| record).skip(options.skip);
    match options.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, key| node.get(key))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
