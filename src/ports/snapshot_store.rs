use crate::domain::{Book, Member, Transaction};
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 現在のスナップショット形式のバージョン
pub const SNAPSHOT_VERSION: u32 = 1;

/// 永続化されるスナップショット
///
/// 書籍・会員・取引の3つのコレクションを1つの文書にまとめる。
/// 各コレクションはID順に並べ、同じ内容なら同じバイト列になるようにする。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub books: Vec<Book>,
    pub members: Vec<Member>,
    pub transactions: Vec<Transaction>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            books: Vec::new(),
            members: Vec::new(),
            transactions: Vec::new(),
        }
    }
}

/// スナップショットストアポート
///
/// 全コレクションを丸ごと読み書きする（追記ログは使わない）。
pub trait SnapshotStore: Send + Sync {
    /// 最後に保存されたスナップショットを読み込む
    ///
    /// まだ一度も保存されていなければ`None`。
    /// 読み込めたが解釈できない場合はエラーを返し、空として扱わない。
    fn load(&self) -> Result<Option<Snapshot>>;

    /// スナップショットを保存する
    ///
    /// 呼び出し側から見て原子的であること：失敗しても直前の正常なスナップショットが残る。
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}
