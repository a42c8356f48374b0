mod reports;

pub use reports::{
    BookStatusCounts, InventoryStats, MemberActivity, MemberStatusCounts, OverdueEntry,
    inventory_stats, member_activity, overdue_report,
};
