//! Persisted batch report entries
use super::bag::InputBag;
use super::timestamp::TimeStamp;

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Submission {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub variant_code: String,
    #[n(2)]
    pub submitter_id: String,
    #[n(3)]
    pub form_data: InputBag, // raw entry with the last derived outputs merged in
    #[n(4)]
    pub created_at: TimeStamp,
    #[n(5)]
    pub updated_at: TimeStamp,
}

impl Submission {
    pub fn new(id: String, variant_code: String, submitter_id: String, form_data: InputBag) -> Self {
        let now = TimeStamp::now();
        Self {
            id,
            variant_code,
            submitter_id,
            form_data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Hash identifying exactly this version of the form data.
    pub fn form_hash(&self) -> anyhow::Result<String> {
        crate::utils::cbor_digest(&self.form_data)
    }
}
