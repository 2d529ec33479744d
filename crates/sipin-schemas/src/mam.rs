//! Archive-system (MediaHaven) record shape.
//!
//! Only the attribute paths the reconciler reads are modelled. Every section
//! and field is optional so that a record missing any of them still decodes;
//! classification then treats the absent field as "does not match".

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MamRecord {
    #[serde(default)]
    pub internal: Option<InternalSection>,
    #[serde(default)]
    pub administrative: Option<AdministrativeSection>,
    #[serde(default)]
    pub descriptive: Option<DescriptiveSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternalSection {
    #[serde(default)]
    pub archive_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdministrativeSection {
    #[serde(default)]
    pub record_status: Option<String>,
    #[serde(default)]
    pub archived_date: Option<String>,
    #[serde(default)]
    pub rejection_date: Option<String>,
    #[serde(default)]
    pub record_rejections: Option<RecordRejections>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordRejections {
    /// MediaHaven serialises a single rejection as an object and several as
    /// an array; both decode to a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub rejection: Vec<Rejection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rejection {
    #[serde(default)]
    pub motivation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescriptiveSection {
    #[serde(default)]
    pub original_filename: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Rejection>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Rejection>),
        One(Rejection),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(v)) => v,
        Some(OneOrMany::One(r)) => vec![r],
        None => Vec::new(),
    })
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl MamRecord {
    /// Decode one record from the raw JSON returned by the search endpoint.
    pub fn from_value(v: &Value) -> Result<Self, serde_json::Error> {
        MamRecord::deserialize(v)
    }

    /// `Internal.ArchiveStatus`
    pub fn archive_status(&self) -> Option<&str> {
        self.internal.as_ref().and_then(|s| non_blank(&s.archive_status))
    }

    /// `Administrative.RecordStatus`
    pub fn record_status(&self) -> Option<&str> {
        self.administrative
            .as_ref()
            .and_then(|s| non_blank(&s.record_status))
    }

    /// `Administrative.ArchivedDate`, unparsed.
    pub fn archived_date(&self) -> Option<&str> {
        self.administrative
            .as_ref()
            .and_then(|s| non_blank(&s.archived_date))
    }

    /// `Administrative.RejectionDate`, unparsed.
    pub fn rejection_date(&self) -> Option<&str> {
        self.administrative
            .as_ref()
            .and_then(|s| non_blank(&s.rejection_date))
    }

    /// Non-blank `Administrative.RecordRejections.Rejection[].Motivation`, in order.
    pub fn rejection_motivations(&self) -> Vec<&str> {
        self.administrative
            .as_ref()
            .and_then(|s| s.record_rejections.as_ref())
            .map(|r| r.rejection.iter().filter_map(|x| non_blank(&x.motivation)).collect())
            .unwrap_or_default()
    }

    /// `Descriptive.OriginalFilename`
    pub fn original_filename(&self) -> Option<&str> {
        self.descriptive
            .as_ref()
            .and_then(|s| non_blank(&s.original_filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_full_record() {
        let v = json!({
            "Internal": {"ArchiveStatus": "completed", "MediaObjectId": "x"},
            "Administrative": {
                "RecordStatus": "Published",
                "ArchivedDate": "2024-05-01T10:00:00Z",
                "RecordRejections": {"Rejection": [{"Motivation": "a"}, {"Motivation": " "}, {"Motivation": "b"}]}
            },
            "Descriptive": {"OriginalFilename": "p1.zip"}
        });
        let r = MamRecord::from_value(&v).unwrap();
        assert_eq!(r.archive_status(), Some("completed"));
        assert_eq!(r.record_status(), Some("Published"));
        assert_eq!(r.archived_date(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(r.rejection_date(), None);
        assert_eq!(r.rejection_motivations(), vec!["a", "b"]);
        assert_eq!(r.original_filename(), Some("p1.zip"));
    }

    #[test]
    fn empty_object_decodes_with_everything_absent() {
        let r = MamRecord::from_value(&json!({})).unwrap();
        assert_eq!(r, MamRecord::default());
        assert_eq!(r.archive_status(), None);
        assert!(r.rejection_motivations().is_empty());
    }

    #[test]
    fn single_rejection_object_decodes_as_list() {
        let v = json!({
            "Administrative": {"RecordRejections": {"Rejection": {"Motivation": "only"}}}
        });
        let r = MamRecord::from_value(&v).unwrap();
        assert_eq!(r.rejection_motivations(), vec!["only"]);
    }

    #[test]
    fn null_rejection_decodes_as_empty() {
        let v = json!({"Administrative": {"RecordRejections": {"Rejection": null}}});
        let r = MamRecord::from_value(&v).unwrap();
        assert!(r.rejection_motivations().is_empty());
    }

    #[test]
    fn wrong_field_type_is_a_decode_error() {
        let v = json!({"Internal": {"ArchiveStatus": 7}});
        assert!(MamRecord::from_value(&v).is_err());
    }
}
