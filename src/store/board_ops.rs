//! Fallback-mode edits of a single board.
//!
//! Each operation either applies completely and returns `true`, or leaves the
//! board untouched and returns `false`. None of them can break the column /
//! task invariant.

use std::collections::HashSet;

use super::models::{Board, Column, Task};

/// Reorders `items` to follow `order`. Ids in `order` that match nothing are
/// ignored, repeats count once, and items the order omitted are appended in
/// their prior relative order.
pub fn apply_order<T>(items: Vec<T>, order: &[String], key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut result = Vec::with_capacity(slots.len());
    let mut placed = HashSet::new();

    for wanted in order {
        if !placed.insert(wanted.as_str()) {
            continue;
        }
        if let Some(slot) = slots
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|item| key(item) == wanted))
            && let Some(item) = slot.take()
        {
            result.push(item);
        }
    }
    result.extend(slots.into_iter().flatten());
    result
}

impl Board {
    pub fn invite(&mut self, user_id: &str) -> bool {
        if user_id.is_empty() || self.owner_id == user_id || self.member_ids.contains(user_id) {
            return false;
        }
        self.member_ids.insert(user_id.to_string());
        true
    }

    pub fn add_column(&mut self, column_id: String, title: &str) -> bool {
        self.columns.push(Column::new(column_id, title));
        true
    }

    pub fn rename_column(&mut self, column_id: &str, title: &str) -> bool {
        match self.column_mut(column_id) {
            Some(column) => {
                column.title = title.to_string();
                true
            }
            None => false,
        }
    }

    /// Removes the column and every task it held.
    pub fn delete_column(&mut self, column_id: &str) -> bool {
        let Some(index) = self.columns.iter().position(|c| c.id == column_id) else {
            return false;
        };
        let column = self.columns.remove(index);
        for task_id in &column.task_ids {
            self.tasks.remove(task_id);
        }
        true
    }

    pub fn reorder_columns(&mut self, order: &[String]) -> bool {
        let columns = std::mem::take(&mut self.columns);
        self.columns = apply_order(columns, order, |c| c.id.as_str());
        true
    }

    /// Creates a task at the end of `column_id`. Nothing is created when the
    /// column does not exist.
    pub fn create_task(&mut self, column_id: &str, task_id: String, title: &str) -> bool {
        let Some(column) = self.column_mut(column_id) else {
            return false;
        };
        column.task_ids.push(task_id.clone());
        self.tasks.insert(task_id.clone(), Task::new(task_id, title));
        true
    }

    pub fn rename_task(&mut self, task_id: &str, title: &str) -> bool {
        self.edit_task(task_id, |task| task.title = title.to_string())
    }

    pub fn set_task_description(&mut self, task_id: &str, description: Option<&str>) -> bool {
        self.edit_task(task_id, |task| {
            task.description = description.map(str::to_string)
        })
    }

    pub fn set_task_tags(&mut self, task_id: &str, tags: &[String]) -> bool {
        self.edit_task(task_id, |task| task.tags = tags.iter().cloned().collect())
    }

    pub fn set_task_assignees(&mut self, task_id: &str, assignee_ids: &[String]) -> bool {
        self.edit_task(task_id, |task| {
            task.assignee_ids = assignee_ids.iter().cloned().collect()
        })
    }

    pub fn delete_task(&mut self, task_id: &str) -> bool {
        if self.tasks.remove(task_id).is_none() {
            return false;
        }
        for column in &mut self.columns {
            column.task_ids.retain(|id| id != task_id);
        }
        true
    }

    /// Moves a task into `to_column_id` at `index`, clamped to the end of the
    /// destination when absent or out of range. The task is pulled out of
    /// every column first so it can never end up placed twice.
    pub fn move_task(
        &mut self,
        task_id: &str,
        from_column_id: &str,
        to_column_id: &str,
        index: Option<usize>,
    ) -> bool {
        if !self.tasks.contains_key(task_id)
            || self.column(from_column_id).is_none()
            || self.column(to_column_id).is_none()
        {
            return false;
        }
        for column in &mut self.columns {
            column.task_ids.retain(|id| id != task_id);
        }
        let Some(destination) = self.column_mut(to_column_id) else {
            return false;
        };
        let at = index
            .filter(|i| *i <= destination.task_ids.len())
            .unwrap_or(destination.task_ids.len());
        destination.task_ids.insert(at, task_id.to_string());
        true
    }

    /// Reorders tasks within one column. Ids that are not in the column are
    /// ignored so a reorder can never pull a task across columns.
    pub fn reorder_tasks(&mut self, column_id: &str, order: &[String]) -> bool {
        let Some(column) = self.column_mut(column_id) else {
            return false;
        };
        let ids = std::mem::take(&mut column.task_ids);
        column.task_ids = apply_order(ids, order, String::as_str);
        true
    }

    fn edit_task(&mut self, task_id: &str, edit: impl FnOnce(&mut Task)) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(task) => {
                edit(task);
                true
            }
            None => false,
        }
    }
}
