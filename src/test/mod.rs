
pub(crate) use fixtures::{DayOfWeek, ListObject, Point, TestObject};
