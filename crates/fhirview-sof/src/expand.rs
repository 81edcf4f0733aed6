//! unionAll expansion.
//!
//! Flattens the `select` tree into an ordered list of concrete branches.
//! Each branch is a vector of [`ResolvedSelect`] nodes with every
//! `unionAll` replaced by one chosen alternative; the final query is the
//! `UNION ALL` of the branches in this order.
//!
//! Ordering is deterministic: for a list of selects, earlier nodes vary
//! slowest; within one node, nested select choices vary slower than the
//! node's own `unionAll` choice. Nested unions are resolved depth-first.

use crate::view_definition::{Column, SelectNode};
use crate::{Error, Result};

/// One select node with `unionAll` resolved away.
///
/// A chosen union branch becomes an extra child, which preserves its own
/// iteration context and nesting.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSelect {
    pub for_each: Option<String>,
    pub for_each_or_null: Option<String>,
    pub columns: Vec<Column>,
    pub children: Vec<ResolvedSelect>,
}

/// Expand a select list into concrete branches.
///
/// # Errors
///
/// Returns [`Error::TooComplex`] when the number of branches exceeds
/// `limit`.
pub(crate) fn expand(selects: &[SelectNode], limit: usize) -> Result<Vec<Vec<ResolvedSelect>>> {
    let mut combinations: Vec<Vec<ResolvedSelect>> = vec![Vec::new()];

    for node in selects {
        let choices = node_choices(node, limit)?;
        check_limit(combinations.len() * choices.len(), limit)?;

        let mut next = Vec::with_capacity(combinations.len() * choices.len());
        for combination in &combinations {
            for choice in &choices {
                let mut extended = combination.clone();
                extended.push(choice.clone());
                next.push(extended);
            }
        }
        combinations = next;
    }

    Ok(combinations)
}

/// All concrete alternatives for one select node, in source order.
fn node_choices(node: &SelectNode, limit: usize) -> Result<Vec<ResolvedSelect>> {
    let child_lists = expand(&node.select, limit)?;

    let union_choices = match &node.union_all {
        None => Vec::new(),
        Some(branches) => {
            let mut choices = Vec::new();
            for branch in branches {
                choices.extend(node_choices(branch, limit)?);
                check_limit(choices.len(), limit)?;
            }
            choices
        }
    };

    let columns = node.column.clone().unwrap_or_default();
    let mut result = Vec::new();

    for child_list in &child_lists {
        if union_choices.is_empty() {
            result.push(ResolvedSelect {
                for_each: node.for_each.clone(),
                for_each_or_null: node.for_each_or_null.clone(),
                columns: columns.clone(),
                children: child_list.clone(),
            });
        } else {
            for union_choice in &union_choices {
                let mut children = child_list.clone();
                children.push(union_choice.clone());
                result.push(ResolvedSelect {
                    for_each: node.for_each.clone(),
                    for_each_or_null: node.for_each_or_null.clone(),
                    columns: columns.clone(),
                    children,
                });
            }
        }
        check_limit(result.len(), limit)?;
    }

    Ok(result)
}

fn check_limit(branches: usize, limit: usize) -> Result<()> {
    if branches > limit {
        return Err(Error::TooComplex { branches, limit });
    }
    Ok(())
}

/// Ordered column names of one branch, in encounter order.
pub(crate) fn branch_column_names(branch: &[ResolvedSelect]) -> Vec<String> {
    let mut names = Vec::new();
    collect_names(branch, &mut names);
    names
}

fn collect_names(nodes: &[ResolvedSelect], names: &mut Vec<String>) {
    for node in nodes {
        for column in &node.columns {
            names.push(column.name.clone());
        }
        collect_names(&node.children, names);
    }
}
