/// 入力書式バリデータポート
///
/// 会員・書籍のフィールドに代入する前に呼ばれる。
/// 貸出サービスからは呼ばれない。
pub trait FieldValidator: Send + Sync {
    fn is_valid_email(&self, email: &str) -> bool;

    fn is_valid_phone(&self, phone: &str) -> bool;

    fn is_valid_isbn(&self, isbn: &str) -> bool;
}
