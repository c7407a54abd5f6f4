use url::Url;

pub trait UrlExt {
    /// Replace (or append) a query parameter. `None` removes it.
    fn query_param(&self, key: &str, value: Option<&str>) -> Url;
}

impl UrlExt for Url {
    #[inline]
    fn query_param(&self, key: &str, value: Option<&str>) -> Url {
        let mut out = self.clone();
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        let mut updated = false;
        for (k, v) in self.query_pairs() {
            if k == key {
                if let Some(value) = value {
                    pairs.append_pair(&k, value);
                }
                updated = true;
            } else if v.is_empty() {
                pairs.append_key_only(&k);
            } else {
                pairs.append_pair(&k, &v);
            }
        }
        if !updated && let Some(value) = value {
            pairs.append_pair(key, value);
        }
        drop(pairs);
        if out.query() == Some("") {
            out.set_query(None);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param() {
        let base = Url::parse("https://example.com/buildlogs?stage=prod&key=old").unwrap();
        assert_eq!(
            base.query_param("key", Some("a/b c.log")).as_str(),
            "https://example.com/buildlogs?stage=prod&key=a%2Fb+c.log"
        );
        assert_eq!(
            base.query_param("key", None).as_str(),
            "https://example.com/buildlogs?stage=prod"
        );
        let bare = Url::parse("https://example.com/buildlogs").unwrap();
        assert_eq!(bare.query_param("key", None).as_str(), "https://example.com/buildlogs");
    }
}
