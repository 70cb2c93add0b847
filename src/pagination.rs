// 📄 Limit/offset pagination for list endpoints
//
// Only kicks in when the caller passes `limit` or `offset`. Links keep every
// other query parameter so a filtered listing pages through the same filter.

use serde::Serialize;

/// SQLite binds LIMIT/OFFSET as i64
const MAX_WINDOW: usize = i64::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    /// None when neither `limit` nor `offset` is present. Unparseable or zero
    /// limits use `default_limit`; an unparseable offset is 0. Both are capped
    /// at `i64::MAX`.
    pub fn from_params(params: &[(String, String)], default_limit: usize) -> Option<Self> {
        let limit = lookup(params, "limit");
        let offset = lookup(params, "offset");

        if limit.is_none() && offset.is_none() {
            return None;
        }

        Some(PageRequest {
            limit: limit
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default_limit.max(1))
                .min(MAX_WINDOW),
            offset: offset
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0)
                .min(MAX_WINDOW),
        })
    }
}

fn lookup<'p>(params: &'p [(String, String)], key: &str) -> Option<&'p str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub first: Option<String>,
    pub last: Option<String>,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap one page of `results` out of `count` matches. `path` and `params`
    /// describe the request, used to build the navigation links.
    pub fn new(
        results: Vec<T>,
        count: usize,
        request: PageRequest,
        path: &str,
        params: &[(String, String)],
    ) -> Self {
        let PageRequest { limit, offset } = request;
        let link = |offset: usize| page_link(path, params, limit, offset);
        let next_offset = offset.saturating_add(limit);
        let has_more = next_offset < count;

        Page {
            count,
            first: (offset > 0).then(|| link(0)),
            last: has_more.then(|| link((count - 1) / limit * limit)),
            next: has_more.then(|| link(next_offset)),
            previous: (offset > 0).then(|| link(offset.saturating_sub(limit))),
            results,
        }
    }
}

fn page_link(path: &str, params: &[(String, String)], limit: usize, offset: usize) -> String {
    let mut query: Vec<String> = params
        .iter()
        .filter(|(k, _)| k != "limit" && k != "offset")
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();

    query.push(format!("limit={}", limit));
    if offset > 0 {
        query.push(format!("offset={}", offset));
    }

    format!("{}?{}", path, query.join("&"))
}
