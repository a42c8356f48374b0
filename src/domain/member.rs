use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ContactInfo, DomainError, EntityMeta, MemberId, Searchable, Validatable};

/// 会員区分 - 貸出上限と延長上限を決める
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipTier {
    #[default]
    Standard,
    Premium,
    Student,
}

impl MembershipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Standard => "STANDARD",
            MembershipTier::Premium => "PREMIUM",
            MembershipTier::Student => "STUDENT",
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会員資格の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Active,
    Expired,
    Suspended,
}

impl MemberStatus {
    pub const ALL: [MemberStatus; 3] = [
        MemberStatus::Active,
        MemberStatus::Expired,
        MemberStatus::Suspended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Expired => "EXPIRED",
            MemberStatus::Suspended => "SUSPENDED",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会員登録時の入力
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub tier: MembershipTier,
    /// 省略時は登録日から1年後
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

/// 会員エンティティ
///
/// `open_loans`（未終了の貸出数）は派生値で永続化しない。
/// リポジトリの読み込み時に取引から再計算し、以後は貸出・返却と同じ変更単位で同期する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    name: String,
    contact: ContactInfo,
    tier: MembershipTier,
    status: MemberStatus,
    expiration_date: NaiveDate,
    #[serde(skip)]
    open_loans: u32,
    #[serde(flatten)]
    meta: EntityMeta,
}

impl Member {
    pub fn new(input: NewMember, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let expiration_date = match input.expiration_date {
            Some(date) => date,
            None => add_years(now.date_naive(), 1)?,
        };
        let member = Self {
            id: MemberId::new(),
            name: input.name.trim().to_string(),
            contact: ContactInfo::new(input.contact.email, input.contact.phone),
            tier: input.tier,
            status: MemberStatus::Active,
            expiration_date,
            open_loans: 0,
            meta: EntityMeta::new(now),
        };
        member.validate()?;
        Ok(member)
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn tier(&self) -> MembershipTier {
        self.tier
    }

    pub fn status(&self) -> MemberStatus {
        self.status
    }

    pub fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }

    /// 未終了の貸出数
    pub fn open_loans(&self) -> u32 {
        self.open_loans
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.meta.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    /// 有効期限内か（期限日当日は有効）
    pub fn is_membership_valid(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() <= self.expiration_date
    }

    pub fn rename(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.update(now, |member| member.name = name.trim().to_string())
    }

    /// 連絡先を変更する（書式は呼び出し側のバリデータで確認済みであること）
    pub fn set_contact(&mut self, contact: ContactInfo, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.update(now, |member| {
            member.contact = ContactInfo::new(contact.email, contact.phone)
        })
    }

    pub fn set_tier(&mut self, tier: MembershipTier, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.update(now, |member| member.tier = tier)
    }

    pub fn suspend(&mut self, now: DateTime<Utc>) {
        self.status = MemberStatus::Suspended;
        self.meta.touch(now);
    }

    /// 停止中の会員資格を再開する（有効期限内に限る）
    pub fn reactivate(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != MemberStatus::Suspended || !self.is_membership_valid(now) {
            return Err(DomainError::NotReactivatable);
        }
        self.status = MemberStatus::Active;
        self.meta.touch(now);
        Ok(())
    }

    /// 有効期限切れを反映する（ACTIVEかつ期限切れの場合のみ）
    ///
    /// 戻り値は状態が変わったかどうか。
    pub fn expire_if_lapsed(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == MemberStatus::Active && !self.is_membership_valid(now) {
            self.status = MemberStatus::Expired;
            self.meta.touch(now);
            return true;
        }
        false
    }

    /// 会員資格を`years`年延長する。EXPIREDの会員はACTIVEに戻る。
    pub fn renew_membership(&mut self, years: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if years == 0 {
            return Err(DomainError::Validation(vec![
                "Renewal duration must be positive".to_string(),
            ]));
        }
        let base = self.expiration_date.max(now.date_naive());
        self.expiration_date = add_years(base, years)?;
        if self.status == MemberStatus::Expired {
            self.status = MemberStatus::Active;
        }
        self.meta.touch(now);
        Ok(())
    }

    pub(crate) fn record_borrow(&mut self) {
        self.open_loans += 1;
    }

    pub(crate) fn record_release(&mut self) {
        self.open_loans = self.open_loans.saturating_sub(1);
    }

    pub(crate) fn set_open_loans(&mut self, count: u32) {
        self.open_loans = count;
    }

    fn update(
        &mut self,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut Member),
    ) -> Result<(), DomainError> {
        let mut candidate = self.clone();
        change(&mut candidate);
        candidate.validate()?;
        candidate.meta.touch(now);
        *self = candidate;
        Ok(())
    }
}

fn add_years(date: NaiveDate, years: u32) -> Result<NaiveDate, DomainError> {
    date.checked_add_months(Months::new(years.saturating_mul(12)))
        .ok_or_else(|| DomainError::Validation(vec!["Expiration date out of range".to_string()]))
}

impl Searchable for Member {
    fn search_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.contact.email.clone(),
            self.contact.phone.clone(),
            self.tier.as_str().to_string(),
        ]
    }
}

impl Validatable for Member {
    fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.is_empty() {
            errors.push("Name is required".to_string());
        }
        errors
    }
}
