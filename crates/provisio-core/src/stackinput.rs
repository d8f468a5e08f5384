use provisio_schema::Provider;
use serde_yaml::{Mapping, Value};

pub const TARGET_KEY: &str = "target";

/// Document handed to Pulumi programs: the manifest under `target` plus one
/// `<provider>ProviderConfig` entry per supplied credential.
#[derive(Debug, Clone, PartialEq)]
pub struct StackInput {
    doc: Mapping,
}

impl StackInput {
    pub fn new(target: Value) -> Self {
        let mut doc = Mapping::new();
        doc.insert(Value::from(TARGET_KEY), target);
        Self { doc }
    }

    pub fn target(&self) -> Option<&Value> {
        self.doc.get(TARGET_KEY)
    }

    /// Credentials are inserted in provider order so the rendered document
    /// does not depend on the order flags were given in.
    pub fn insert_credentials(&mut self, provider: Provider, blob: Value) {
        let key = provider.credential_key();
        let mut entries: Vec<(Value, Value)> = std::mem::take(&mut self.doc).into_iter().collect();
        entries.retain(|(k, _)| k.as_str() != Some(key.as_str()));
        entries.push((Value::from(key), blob));
        entries[1..].sort_by(|(a, _), (b, _)| a.as_str().cmp(&b.as_str()));
        self.doc = entries.into_iter().collect();
    }

    pub fn credentials(&self, provider: Provider) -> Option<&Value> {
        self.doc.get(provider.credential_key())
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_comes_first_then_sorted_providers() {
        let mut input = StackInput::new(serde_yaml::from_str("kind: AwsVpc\n").unwrap());
        input.insert_credentials(Provider::Gcp, Value::from("g"));
        input.insert_credentials(Provider::Aws, Value::from("a"));
        let yaml = input.to_yaml().unwrap();
        assert_eq!(
            yaml,
            "target:\n  kind: AwsVpc\nawsProviderConfig: a\ngcpProviderConfig: g\n"
        );
    }

    #[test]
    fn reinserting_replaces() {
        let mut input = StackInput::new(Value::Null);
        input.insert_credentials(Provider::Aws, Value::from("old"));
        input.insert_credentials(Provider::Aws, Value::from("new"));
        assert_eq!(input.credentials(Provider::Aws), Some(&Value::from("new")));
        assert_eq!(input.to_yaml().unwrap().matches("awsProviderConfig").count(), 1);
        assert_eq!(input.target(), Some(&Value::Null));
    }
}
