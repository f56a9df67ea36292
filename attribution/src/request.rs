use serde::Serialize;

pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";
pub const NAME: &str = "name";
pub const GCLID: &str = "gclid";
pub const EVENT_NAME: &str = "event_name";
pub const INSTALL_REFERRER: &str = "install_referrer";
pub const BFPID: &str = "bfpid";

/// Identity and campaign hints sent to the match service.
///
/// Keys are unique and keep the position of their first insertion; setting an existing key
/// replaces its value. The more hints are provided, the more accurate the match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionRequest {
    params: Vec<(String, String)>,
}

impl AttributionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a request from pairs; later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::new();
        for (key, value) in pairs {
            request.set(key, value);
        }
        request
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn with_custom_param(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_email(self, email: &str) -> Self {
        self.with_custom_param(EMAIL, email)
    }

    pub fn with_phone(self, phone: &str) -> Self {
        self.with_custom_param(PHONE, phone)
    }

    pub fn with_name(self, name: &str) -> Self {
        self.with_custom_param(NAME, name)
    }

    pub fn with_gclid(self, gclid: &str) -> Self {
        self.with_custom_param(GCLID, gclid)
    }

    /// Flatten into the wire payload.
    pub fn to_payload(&self) -> MatchPayload<'_> {
        MatchPayload {
            metadata: self
                .params
                .iter()
                .map(|(key, value)| MetadataItem {
                    key: key.as_str(),
                    value: value.as_str(),
                })
                .collect(),
        }
    }
}

/// Body of `POST <base>/match`: `{"metadata": [{"key": .., "value": ..}, ..]}`.
#[derive(Debug, Serialize)]
pub struct MatchPayload<'a> {
    pub metadata: Vec<MetadataItem<'a>>,
}

#[derive(Debug, Serialize)]
pub struct MetadataItem<'a> {
    pub key: &'a str,
    pub value: &'a str,
}
