use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::status::{EntityType, IdentityStatus, ListingStatus, SubmissionStatus};

/// Identifier of an authenticated platform user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

/// Identifier for identity, questionnaire, and sponsor records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

/// Identifier for property listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingId(pub String);

macro_rules! display_inner {
    ($($ty:ident),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_inner!(SubjectId, SubmissionId, ListingId);

/// A form field that is either still outstanding or has been supplied.
///
/// Serialized as the bare value, with `null` (or an absent key) meaning not provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer<T> {
    NotProvided,
    Provided(T),
}

impl<T> Default for Answer<T> {
    fn default() -> Self {
        Answer::NotProvided
    }
}

impl<T> Answer<T> {
    pub fn is_provided(&self) -> bool {
        matches!(self, Answer::Provided(_))
    }

    pub fn provided(self) -> Option<T> {
        match self {
            Answer::NotProvided => None,
            Answer::Provided(value) => Some(value),
        }
    }

    /// Take the value or report which field is still outstanding.
    pub fn require(self, field: &'static str) -> Result<T, FieldError> {
        self.provided().ok_or(FieldError::Missing { field })
    }

    /// Keep `self` when provided, otherwise fall back to `other`.
    pub fn or(self, other: Answer<T>) -> Answer<T> {
        match self {
            Answer::Provided(_) => self,
            Answer::NotProvided => other,
        }
    }
}

impl Answer<String> {
    /// Treat blank strings as not provided and trim the rest.
    pub fn normalized(self) -> Answer<String> {
        match self {
            Answer::Provided(value) if !value.trim().is_empty() => {
                Answer::Provided(value.trim().to_string())
            }
            _ => Answer::NotProvided,
        }
    }
}

impl<T> From<Option<T>> for Answer<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Answer::Provided(value),
            None => Answer::NotProvided,
        }
    }
}

impl<T: Serialize> Serialize for Answer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Answer::NotProvided => serializer.serialize_none(),
            Answer::Provided(value) => serializer.serialize_some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Answer<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Answer::from)
    }
}

/// Field-level validation failure, surfaced to clients next to the offending input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl FieldError {
    pub fn field(&self) -> &'static str {
        match self {
            FieldError::Missing { field } | FieldError::Invalid { field, .. } => field,
        }
    }
}

/// Reference returned by document storage. Only the reference is kept, never file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference(pub String);

impl DocumentReference {
    pub fn validate(&self) -> Result<(), FieldError> {
        let value = self.0.trim();
        if value.is_empty() || value.chars().any(char::is_whitespace) || !value.contains("://")
        {
            return Err(FieldError::Invalid {
                field: "documents",
                reason: format!("'{}' is not a storage reference", self.0),
            });
        }
        Ok(())
    }
}

fn validate_documents(documents: &[DocumentReference]) -> Result<(), FieldError> {
    documents.iter().try_for_each(DocumentReference::validate)
}

/// Contact and display fields collected on the profile stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default)]
    pub username: Answer<String>,
    #[serde(default)]
    pub first_name: Answer<String>,
    #[serde(default)]
    pub last_name: Answer<String>,
    #[serde(default)]
    pub phone: Answer<String>,
}

impl ProfileFields {
    pub fn is_complete(&self) -> bool {
        self.username.is_provided()
            && self.first_name.is_provided()
            && self.last_name.is_provided()
            && self.phone.is_provided()
    }
}

/// A platform user moving through onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSubject {
    pub id: SubjectId,
    pub profile: ProfileFields,
    pub created_at: DateTime<Utc>,
    /// Set when the subject finished onboarding without creating a sponsor profile.
    pub sponsor_skipped_at: Option<DateTime<Utc>>,
}

impl VerificationSubject {
    pub fn new(id: SubjectId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            profile: ProfileFields::default(),
            created_at,
            sponsor_skipped_at: None,
        }
    }

    pub fn profile_complete(&self) -> bool {
        self.profile.is_complete()
    }
}

/// KYC record, created lazily on the first verification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityVerification {
    pub id: SubmissionId,
    pub subject_id: SubjectId,
    pub status: IdentityStatus,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestorClassification {
    Individual,
    Joint,
    Entity,
    Trust,
    RetirementAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceTier {
    FirstTime,
    Limited,
    Moderate,
    Extensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    Balanced,
    Aggressive,
}

/// Regulatory basis the investor claims for accreditation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccreditationType {
    Income,
    NetWorth,
    LicensedProfessional,
    QualifiedEntity,
    NonAccredited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    ThirdPartyLetter,
    DocumentReview,
    SelfCertification,
}

/// Investor questionnaire as sent by the client; any field may still be outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionnaireSubmission {
    #[serde(default)]
    pub classification: Answer<InvestorClassification>,
    #[serde(default)]
    pub experience: Answer<ExperienceTier>,
    #[serde(default)]
    pub risk_tolerance: Answer<RiskTolerance>,
    #[serde(default)]
    pub liquid_net_worth_usd: Answer<u64>,
    #[serde(default)]
    pub tax_country: Answer<String>,
    #[serde(default)]
    pub accreditation: Answer<AccreditationType>,
    #[serde(default)]
    pub verification_method: Answer<VerificationMethod>,
    #[serde(default)]
    pub documents: Vec<DocumentReference>,
}

/// Validated questionnaire answers held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireAnswers {
    pub classification: InvestorClassification,
    pub experience: ExperienceTier,
    pub risk_tolerance: RiskTolerance,
    pub liquid_net_worth_usd: u64,
    pub tax_country: String,
    pub accreditation: AccreditationType,
    #[serde(default)]
    pub verification_method: Answer<VerificationMethod>,
    pub documents: Vec<DocumentReference>,
}

impl QuestionnaireSubmission {
    pub fn validate(self) -> Result<QuestionnaireAnswers, FieldError> {
        let tax_country = self.tax_country.normalized().require("tax_country")?;
        if tax_country.len() != 2 || !tax_country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FieldError::Invalid {
                field: "tax_country",
                reason: "expected a two-letter country code".to_string(),
            });
        }
        let accreditation = self.accreditation.require("accreditation")?;
        if accreditation != AccreditationType::NonAccredited && self.documents.is_empty() {
            return Err(FieldError::Missing { field: "documents" });
        }
        validate_documents(&self.documents)?;

        Ok(QuestionnaireAnswers {
            classification: self.classification.require("classification")?,
            experience: self.experience.require("experience")?,
            risk_tolerance: self.risk_tolerance.require("risk_tolerance")?,
            liquid_net_worth_usd: self.liquid_net_worth_usd.require("liquid_net_worth_usd")?,
            tax_country: tax_country.to_ascii_uppercase(),
            accreditation,
            verification_method: self.verification_method,
            documents: self.documents,
        })
    }
}

/// At most one per subject; re-submission updates it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorQuestionnaire {
    pub id: SubmissionId,
    pub subject_id: SubjectId,
    pub answers: QuestionnaireAnswers,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    LimitedLiabilityCompany,
    Corporation,
    Partnership,
    SoleProprietorship,
    Trust,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Answer<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl PostalAddress {
    fn validate(&self) -> Result<(), FieldError> {
        for (field, value) in [
            ("address.line1", &self.line1),
            ("address.city", &self.city),
            ("address.postal_code", &self.postal_code),
            ("address.country", &self.country),
        ] {
            if value.trim().is_empty() {
                return Err(FieldError::Missing { field });
            }
        }
        Ok(())
    }
}

/// Checksum-free EVM style address (`0x` followed by 40 hex digits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    pub fn validate(&self) -> Result<(), FieldError> {
        let hex = self.0.strip_prefix("0x").unwrap_or_default();
        if hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(())
        } else {
            Err(FieldError::Invalid {
                field: "wallet_address",
                reason: "expected 0x followed by 40 hex digits".to_string(),
            })
        }
    }
}

/// Team member granted co-authorship of a sponsor's listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingMember {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub display_name: Answer<String>,
}

/// Sponsor KYB submission as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KybSubmission {
    #[serde(default)]
    pub business_legal_name: Answer<String>,
    #[serde(default)]
    pub business_type: Answer<BusinessType>,
    #[serde(default)]
    pub tax_id: Answer<String>,
    #[serde(default)]
    pub address: Answer<PostalAddress>,
    #[serde(default)]
    pub bio: Answer<String>,
    #[serde(default)]
    pub wallet_address: Answer<WalletAddress>,
    #[serde(default)]
    pub documents: Vec<DocumentReference>,
}

/// Validated business details held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KybDetails {
    pub business_legal_name: String,
    pub business_type: BusinessType,
    pub tax_id: String,
    pub address: PostalAddress,
    pub documents: Vec<DocumentReference>,
}

impl KybSubmission {
    /// Split into verified business details and the freely editable presentation fields.
    pub fn validate(self) -> Result<(KybDetails, SponsorPresentation), FieldError> {
        let tax_id = self.tax_id.normalized().require("tax_id")?;
        if !tax_id.chars().any(|c| c.is_ascii_digit()) {
            return Err(FieldError::Invalid {
                field: "tax_id",
                reason: "must contain digits".to_string(),
            });
        }
        let address = self.address.require("address")?;
        address.validate()?;
        if self.documents.is_empty() {
            return Err(FieldError::Missing { field: "documents" });
        }
        validate_documents(&self.documents)?;
        if let Answer::Provided(wallet) = &self.wallet_address {
            wallet.validate()?;
        }

        let details = KybDetails {
            business_legal_name: self
                .business_legal_name
                .normalized()
                .require("business_legal_name")?,
            business_type: self.business_type.require("business_type")?,
            tax_id,
            address,
            documents: self.documents,
        };
        let presentation = SponsorPresentation {
            bio: self.bio.normalized(),
            wallet_address: self.wallet_address,
            voting_members: Vec::new(),
        };
        Ok((details, presentation))
    }
}

/// Sponsor fields that can change without re-verification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SponsorPresentation {
    #[serde(default)]
    pub bio: Answer<String>,
    #[serde(default)]
    pub wallet_address: Answer<WalletAddress>,
    #[serde(default)]
    pub voting_members: Vec<VotingMember>,
}

/// Partial update for [`SponsorPresentation`]; absent keys leave the stored value alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SponsorProfilePatch {
    #[serde(default)]
    pub bio: Answer<String>,
    #[serde(default)]
    pub wallet_address: Answer<WalletAddress>,
    #[serde(default)]
    pub voting_members: Option<Vec<VotingMember>>,
}

impl SponsorProfilePatch {
    pub fn validate(&self, owner: &SubjectId) -> Result<(), FieldError> {
        if let Answer::Provided(wallet) = &self.wallet_address {
            wallet.validate()?;
        }
        if let Some(members) = &self.voting_members {
            for (index, member) in members.iter().enumerate() {
                if &member.subject_id == owner {
                    return Err(FieldError::Invalid {
                        field: "voting_members",
                        reason: "the sponsor already owns its listings".to_string(),
                    });
                }
                if members[..index]
                    .iter()
                    .any(|other| other.subject_id == member.subject_id)
                {
                    return Err(FieldError::Invalid {
                        field: "voting_members",
                        reason: format!("{} listed twice", member.subject_id),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn apply(self, presentation: &mut SponsorPresentation) {
        if let Answer::Provided(bio) = self.bio.normalized() {
            presentation.bio = Answer::Provided(bio);
        }
        if let Answer::Provided(wallet) = self.wallet_address {
            presentation.wallet_address = Answer::Provided(wallet);
        }
        if let Some(members) = self.voting_members {
            presentation.voting_members = members;
        }
    }
}

/// At most one per subject; owns the subject's listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorProfile {
    pub id: SubmissionId,
    pub subject_id: SubjectId,
    pub details: KybDetails,
    pub presentation: SponsorPresentation,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SponsorProfile {
    pub fn is_co_author(&self, subject: &SubjectId) -> bool {
        &self.subject_id == subject
            || self
                .presentation
                .voting_members
                .iter()
                .any(|member| &member.subject_id == subject)
    }
}

/// Property submission as authored by a sponsor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListingDraft {
    #[serde(default)]
    pub title: Answer<String>,
    #[serde(default)]
    pub property_address: Answer<String>,
    #[serde(default)]
    pub description: Answer<String>,
    #[serde(default)]
    pub target_raise_usd: Answer<u64>,
    #[serde(default)]
    pub minimum_investment_usd: Answer<u64>,
    #[serde(default)]
    pub documents: Vec<DocumentReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub title: String,
    pub property_address: String,
    #[serde(default)]
    pub description: Answer<String>,
    pub target_raise_usd: u64,
    pub minimum_investment_usd: u64,
    pub documents: Vec<DocumentReference>,
}

impl ListingDraft {
    pub fn validate(self) -> Result<ListingDetails, FieldError> {
        let target_raise_usd = self.target_raise_usd.require("target_raise_usd")?;
        let minimum_investment_usd = self
            .minimum_investment_usd
            .require("minimum_investment_usd")?;
        if target_raise_usd == 0 {
            return Err(FieldError::Invalid {
                field: "target_raise_usd",
                reason: "must be greater than zero".to_string(),
            });
        }
        if minimum_investment_usd == 0 || minimum_investment_usd > target_raise_usd {
            return Err(FieldError::Invalid {
                field: "minimum_investment_usd",
                reason: "must be between 1 and the target raise".to_string(),
            });
        }
        validate_documents(&self.documents)?;

        Ok(ListingDetails {
            title: self.title.normalized().require("title")?,
            property_address: self
                .property_address
                .normalized()
                .require("property_address")?,
            description: self.description.normalized(),
            target_raise_usd,
            minimum_investment_usd,
            documents: self.documents,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub sponsor_profile_id: SubmissionId,
    pub owner: SubjectId,
    pub details: ListingDetails,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Admin,
    Subject,
}

/// Trimmed comment body; blank comments are rejected.
pub fn comment_content(raw: &str) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::Missing { field: "content" });
    }
    Ok(trimmed.to_string())
}

/// Append-only feedback attached to a reviewable entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Owner of the reviewed entity, i.e. who may read external comments.
    pub subject_id: SubjectId,
    pub author: SubjectId,
    pub author_role: AuthorRole,
    pub content: String,
    pub internal: bool,
    pub created_at: DateTime<Utc>,
}

/// User-facing message queued for the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject_id: SubjectId,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_round_trips_null_as_not_provided() {
        let draft: QuestionnaireSubmission =
            serde_json::from_value(json!({ "tax_country": null, "experience": "limited" }))
                .expect("payload parses");
        assert_eq!(draft.tax_country, Answer::NotProvided);
        assert_eq!(draft.experience, Answer::Provided(ExperienceTier::Limited));
        assert_eq!(draft.classification, Answer::NotProvided);

        let value = serde_json::to_value(&draft).expect("serializes");
        assert_eq!(value["tax_country"], serde_json::Value::Null);
        assert_eq!(value["experience"], json!("limited"));
    }

    #[test]
    fn questionnaire_reports_first_missing_field() {
        let draft = QuestionnaireSubmission {
            tax_country: Answer::Provided("us".to_string()),
            accreditation: Answer::Provided(AccreditationType::NonAccredited),
            ..Default::default()
        };
        assert_eq!(
            draft.validate(),
            Err(FieldError::Missing {
                field: "classification"
            })
        );
    }

    #[test]
    fn accredited_questionnaire_requires_documents() {
        let draft = QuestionnaireSubmission {
            classification: Answer::Provided(InvestorClassification::Individual),
            experience: Answer::Provided(ExperienceTier::Moderate),
            risk_tolerance: Answer::Provided(RiskTolerance::Balanced),
            liquid_net_worth_usd: Answer::Provided(1_500_000),
            tax_country: Answer::Provided("us".to_string()),
            accreditation: Answer::Provided(AccreditationType::NetWorth),
            verification_method: Answer::NotProvided,
            documents: Vec::new(),
        };
        assert_eq!(
            draft.clone().validate(),
            Err(FieldError::Missing { field: "documents" })
        );

        let with_docs = QuestionnaireSubmission {
            documents: vec![DocumentReference(
                "https://files.example/statements/q1.pdf".to_string(),
            )],
            ..draft
        };
        let answers = with_docs.validate().expect("valid questionnaire");
        assert_eq!(answers.tax_country, "US");
    }

    #[test]
    fn wallet_address_requires_hex_body() {
        assert!(WalletAddress(format!("0x{}", "a1".repeat(20)))
            .validate()
            .is_ok());
        assert!(WalletAddress("0x1234".to_string()).validate().is_err());
        assert!(WalletAddress(format!("1x{}", "a1".repeat(20)))
            .validate()
            .is_err());
    }

    #[test]
    fn patch_rejects_duplicate_voting_members() {
        let owner = SubjectId("sponsor-1".to_string());
        let member = VotingMember {
            subject_id: SubjectId("member-1".to_string()),
            display_name: Answer::NotProvided,
        };
        let patch = SponsorProfilePatch {
            voting_members: Some(vec![member.clone(), member]),
            ..Default::default()
        };
        assert_eq!(patch.validate(&owner).map_err(|e| e.field()), Err("voting_members"));
    }

    #[test]
    fn listing_minimum_cannot_exceed_target() {
        let draft = ListingDraft {
            title: Answer::Provided("Elm Street Duplex".to_string()),
            property_address: Answer::Provided("12 Elm St".to_string()),
            target_raise_usd: Answer::Provided(1_000),
            minimum_investment_usd: Answer::Provided(5_000),
            ..Default::default()
        };
        assert_eq!(
            draft.validate().map_err(|e| e.field()),
            Err("minimum_investment_usd")
        );
    }
}
