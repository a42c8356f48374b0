pub mod catalog;
pub mod lending;
pub mod reporting;

use crate::domain::policy::LendingPolicy;
use crate::ports::FieldValidator;
use crate::repository::SharedRepository;
use std::sync::Arc;

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、各サービス関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub repository: SharedRepository,
    pub policy: Arc<LendingPolicy>,
    pub validator: Arc<dyn FieldValidator>,
}

impl ServiceDependencies {
    pub fn new(
        repository: SharedRepository,
        policy: LendingPolicy,
        validator: Arc<dyn FieldValidator>,
    ) -> Self {
        Self {
            repository,
            policy: Arc::new(policy),
            validator,
        }
    }
}
