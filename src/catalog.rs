use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use crate::error::{FieldErrors, KopilkaError, Result};
use crate::models::{Category, ExpenseLink, Project, Status, Subcategory};
use crate::preferences;

const MAX_NAME_LEN: usize = 100;

/// Case-insensitive comparison key for user-typed names.
///
/// SQLite's NOCASE collation only folds ASCII, and most names here are Cyrillic,
/// so name lookups fetch the user's rows and compare keys in Rust.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn check_name(name: &str) -> std::result::Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name must be at most {MAX_NAME_LEN} characters"));
    }
    Ok(name.to_string())
}

fn validated_name(name: &str) -> Result<String> {
    check_name(name).map_err(|msg| KopilkaError::Validation(FieldErrors::single("name", msg)))
}

/// First non-deleted row of `table` whose name matches, active rows preferred.
fn find_named(conn: &Connection, table: &str, user_id: i64, name: &str) -> Result<Option<(i64, Status)>> {
    let key = name_key(name);
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, status FROM {table} \
         WHERE user_id = ?1 AND status != 'deleted' \
         ORDER BY status = 'active' DESC, id"
    ))?;
    let rows = stmt.query_map([user_id], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, Status>(2)?))
    })?;
    for row in rows {
        let (id, existing, status) = row?;
        if name_key(&existing) == key {
            return Ok(Some((id, status)));
        }
    }
    Ok(None)
}

fn set_status(conn: &Connection, table: &str, id: i64, status: Status) -> Result<()> {
    conn.execute(
        &format!("UPDATE {table} SET status = ?1 WHERE id = ?2"),
        params![status, id],
    )?;
    Ok(())
}

// --- Projects ---

fn map_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
    })
}

pub fn get_project(conn: &Connection, user_id: i64, project_id: i64) -> Result<Project> {
    conn.query_row(
        "SELECT id, user_id, name, description, status FROM projects WHERE id = ?1 AND user_id = ?2",
        [project_id, user_id],
        map_project,
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("project {project_id}")))
}

pub fn get_active_project(conn: &Connection, user_id: i64, project_id: i64) -> Result<Project> {
    let project = get_project(conn, user_id, project_id)?;
    if project.status != Status::Active {
        return Err(KopilkaError::NotFound(format!("project {project_id}")));
    }
    Ok(project)
}

pub fn find_project_by_name(conn: &Connection, user_id: i64, name: &str) -> Result<Option<Project>> {
    match find_named(conn, "projects", user_id, name)? {
        Some((id, _)) => Ok(Some(get_project(conn, user_id, id)?)),
        None => Ok(None),
    }
}

pub fn list_projects(conn: &Connection, user_id: i64, status: Option<Status>) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, description, status FROM projects \
         WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2) AND status != 'deleted' \
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map(params![user_id, status], map_project)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn ensure_project_name_free(
    conn: &Connection,
    user_id: i64,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<()> {
    if let Some((id, _)) = find_named(conn, "projects", user_id, name)? {
        if Some(id) != exclude_id {
            return Err(KopilkaError::Validation(FieldErrors::single(
                "name",
                "A project with this name already exists",
            )));
        }
    }
    Ok(())
}

pub fn create_project(
    conn: &Connection,
    user_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Project> {
    let name = validated_name(name)?;
    ensure_project_name_free(conn, user_id, &name, None)?;
    let description = description.map(str::trim).filter(|d| !d.is_empty());
    conn.execute(
        "INSERT INTO projects (user_id, name, description, status) VALUES (?1, ?2, ?3, 'active')",
        params![user_id, name, description],
    )?;
    let id = conn.last_insert_rowid();
    info!(user_id, project_id = id, "project created");
    get_project(conn, user_id, id)
}

pub fn update_project(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<Project> {
    get_active_project(conn, user_id, project_id)?;
    let name = validated_name(name)?;
    ensure_project_name_free(conn, user_id, &name, Some(project_id))?;
    let description = description.map(str::trim).filter(|d| !d.is_empty());
    conn.execute(
        "UPDATE projects SET name = ?1, description = ?2 WHERE id = ?3",
        params![name, description, project_id],
    )?;
    get_project(conn, user_id, project_id)
}

pub fn archive_project(conn: &Connection, user_id: i64, project_id: i64) -> Result<()> {
    get_active_project(conn, user_id, project_id)?;
    set_status(conn, "projects", project_id, Status::Archived)?;
    preferences::forget_project(conn, user_id, project_id)?;
    info!(user_id, project_id, "project archived");
    Ok(())
}

/// Soft-delete a project together with its active links.
pub fn delete_project(conn: &Connection, user_id: i64, project_id: i64) -> Result<()> {
    let project = get_project(conn, user_id, project_id)?;
    if project.status == Status::Deleted {
        return Err(KopilkaError::NotFound(format!("project {project_id}")));
    }
    let tx = conn.unchecked_transaction()?;
    set_status(&tx, "projects", project_id, Status::Deleted)?;
    tx.execute(
        "UPDATE expense_links SET status = 'deleted' WHERE project_id = ?1 AND status = 'active'",
        [project_id],
    )?;
    preferences::forget_project(&tx, user_id, project_id)?;
    tx.commit()?;
    info!(user_id, project_id, "project deleted");
    Ok(())
}

// --- Categories and subcategories ---

fn map_named<T>(build: fn(i64, i64, String, Status) -> T) -> impl Fn(&Row) -> rusqlite::Result<T> {
    move |row| Ok(build(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn category_from(id: i64, user_id: i64, name: String, status: Status) -> Category {
    Category { id, user_id, name, status }
}

fn subcategory_from(id: i64, user_id: i64, name: String, status: Status) -> Subcategory {
    Subcategory { id, user_id, name, status }
}

pub fn get_category(conn: &Connection, user_id: i64, category_id: i64) -> Result<Category> {
    conn.query_row(
        "SELECT id, user_id, name, status FROM categories WHERE id = ?1 AND user_id = ?2",
        [category_id, user_id],
        map_named(category_from),
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("category {category_id}")))
}

pub fn get_subcategory(conn: &Connection, user_id: i64, subcategory_id: i64) -> Result<Subcategory> {
    conn.query_row(
        "SELECT id, user_id, name, status FROM subcategories WHERE id = ?1 AND user_id = ?2",
        [subcategory_id, user_id],
        map_named(subcategory_from),
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("subcategory {subcategory_id}")))
}

/// Existing non-deleted category with this name (reactivated if archived), or a new one.
pub fn find_or_create_category(conn: &Connection, user_id: i64, name: &str) -> Result<Category> {
    let name = validated_name(name)?;
    let id = match find_named(conn, "categories", user_id, &name)? {
        Some((id, Status::Active)) => id,
        Some((id, _)) => {
            set_status(conn, "categories", id, Status::Active)?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO categories (user_id, name, status) VALUES (?1, ?2, 'active')",
                params![user_id, name],
            )?;
            conn.last_insert_rowid()
        }
    };
    get_category(conn, user_id, id)
}

pub fn find_or_create_subcategory(conn: &Connection, user_id: i64, name: &str) -> Result<Subcategory> {
    let name = validated_name(name)?;
    let id = match find_named(conn, "subcategories", user_id, &name)? {
        Some((id, Status::Active)) => id,
        Some((id, _)) => {
            set_status(conn, "subcategories", id, Status::Active)?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO subcategories (user_id, name, status) VALUES (?1, ?2, 'active')",
                params![user_id, name],
            )?;
            conn.last_insert_rowid()
        }
    };
    get_subcategory(conn, user_id, id)
}

pub fn add_category(conn: &Connection, user_id: i64, project_id: i64, name: &str) -> Result<Category> {
    get_active_project(conn, user_id, project_id)?;
    let category = find_or_create_category(conn, user_id, name)?;
    let already_linked: bool = conn
        .prepare(
            "SELECT 1 FROM expense_links \
             WHERE project_id = ?1 AND category_id = ?2 AND status = 'active'",
        )?
        .exists([project_id, category.id])?;
    if already_linked {
        return Err(KopilkaError::Conflict(format!(
            "category \"{}\" already exists in this project",
            category.name
        )));
    }
    create_link(conn, user_id, project_id, category.id, None)?;
    info!(user_id, project_id, category_id = category.id, "category added");
    Ok(category)
}

fn require_link(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    subcategory_id: Option<i64>,
) -> Result<()> {
    // Without a subcategory any active link of the category in the project counts.
    let found = conn
        .prepare(
            "SELECT 1 FROM expense_links WHERE user_id = ?1 AND project_id = ?2 \
             AND category_id = ?3 AND (?4 IS NULL OR subcategory_id = ?4) AND status = 'active'",
        )?
        .exists(params![user_id, project_id, category_id, subcategory_id])?;
    if found {
        Ok(())
    } else {
        Err(KopilkaError::NotFound(match subcategory_id {
            Some(sid) => format!("subcategory {sid} in category {category_id}"),
            None => format!("category {category_id} in project {project_id}"),
        }))
    }
}

/// Renaming a category renames it in every project that links it.
pub fn rename_category(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    name: &str,
) -> Result<Category> {
    require_link(conn, user_id, project_id, category_id, None)?;
    let name = validated_name(name)?;
    if let Some((id, _)) = find_named(conn, "categories", user_id, &name)? {
        if id != category_id {
            return Err(KopilkaError::Validation(FieldErrors::single(
                "name",
                "A category with this name already exists",
            )));
        }
    }
    conn.execute(
        "UPDATE categories SET name = ?1 WHERE id = ?2",
        params![name, category_id],
    )?;
    get_category(conn, user_id, category_id)
}

pub fn rename_subcategory(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    subcategory_id: i64,
    name: &str,
) -> Result<Subcategory> {
    require_link(conn, user_id, project_id, category_id, Some(subcategory_id))?;
    let name = validated_name(name)?;
    if let Some((id, _)) = find_named(conn, "subcategories", user_id, &name)? {
        if id != subcategory_id {
            return Err(KopilkaError::Validation(FieldErrors::single(
                "name",
                "A subcategory with this name already exists",
            )));
        }
    }
    conn.execute(
        "UPDATE subcategories SET name = ?1 WHERE id = ?2",
        params![name, subcategory_id],
    )?;
    get_subcategory(conn, user_id, subcategory_id)
}

fn has_active_links(conn: &Connection, column: &str, id: i64) -> Result<bool> {
    Ok(conn
        .prepare(&format!(
            "SELECT 1 FROM expense_links WHERE {column} = ?1 AND status = 'active'"
        ))?
        .exists([id])?)
}

/// Remove a category from one project.
///
/// The project's links to the category go first; the category itself, and any of
/// its subcategories left without an active link, are deleted once orphaned.
pub fn delete_category(conn: &Connection, user_id: i64, project_id: i64, category_id: i64) -> Result<()> {
    require_link(conn, user_id, project_id, category_id, None)?;
    let tx = conn.unchecked_transaction()?;

    let subcategory_ids: Vec<i64> = tx
        .prepare(
            "SELECT DISTINCT subcategory_id FROM expense_links \
             WHERE project_id = ?1 AND category_id = ?2 AND status = 'active' \
             AND subcategory_id IS NOT NULL",
        )?
        .query_map([project_id, category_id], |r| r.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    tx.execute(
        "UPDATE expense_links SET status = 'deleted' \
         WHERE project_id = ?1 AND category_id = ?2 AND status = 'active'",
        [project_id, category_id],
    )?;

    if !has_active_links(&tx, "category_id", category_id)? {
        set_status(&tx, "categories", category_id, Status::Deleted)?;
    }
    for subcategory_id in subcategory_ids {
        if !has_active_links(&tx, "subcategory_id", subcategory_id)? {
            set_status(&tx, "subcategories", subcategory_id, Status::Deleted)?;
        }
    }
    tx.commit()?;
    info!(user_id, project_id, category_id, "category removed from project");
    Ok(())
}

pub fn add_subcategory(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    name: &str,
) -> Result<Subcategory> {
    get_active_project(conn, user_id, project_id)?;
    require_link(conn, user_id, project_id, category_id, None)?;
    let subcategory = find_or_create_subcategory(conn, user_id, name)?;
    if find_active_link(conn, user_id, project_id, category_id, Some(subcategory.id))?.is_some() {
        return Err(KopilkaError::Conflict(format!(
            "subcategory \"{}\" already exists in this category",
            subcategory.name
        )));
    }
    create_link(conn, user_id, project_id, category_id, Some(subcategory.id))?;
    Ok(subcategory)
}

pub fn delete_subcategory(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    subcategory_id: i64,
) -> Result<()> {
    require_link(conn, user_id, project_id, category_id, Some(subcategory_id))?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE expense_links SET status = 'deleted' WHERE project_id = ?1 \
         AND category_id = ?2 AND subcategory_id = ?3 AND status = 'active'",
        [project_id, category_id, subcategory_id],
    )?;
    if !has_active_links(&tx, "subcategory_id", subcategory_id)? {
        set_status(&tx, "subcategories", subcategory_id, Status::Deleted)?;
    }
    tx.commit()?;
    Ok(())
}

// --- Expense links ---

fn map_link(row: &Row) -> rusqlite::Result<ExpenseLink> {
    Ok(ExpenseLink {
        id: row.get(0)?,
        user_id: row.get(1)?,
        project_id: row.get(2)?,
        category_id: row.get(3)?,
        subcategory_id: row.get(4)?,
        status: row.get(5)?,
    })
}

pub fn get_link(conn: &Connection, link_id: i64) -> Result<ExpenseLink> {
    conn.query_row(
        "SELECT id, user_id, project_id, category_id, subcategory_id, status \
         FROM expense_links WHERE id = ?1",
        [link_id],
        map_link,
    )
    .optional()?
    .ok_or_else(|| KopilkaError::NotFound(format!("expense link {link_id}")))
}

/// The active link for exactly this triple; `None` subcategory matches only category-level links.
pub fn find_active_link(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    subcategory_id: Option<i64>,
) -> Result<Option<ExpenseLink>> {
    let link = conn
        .query_row(
            "SELECT id, user_id, project_id, category_id, subcategory_id, status \
             FROM expense_links WHERE user_id = ?1 AND project_id = ?2 AND category_id = ?3 \
             AND subcategory_id IS ?4 AND status = 'active' ORDER BY id LIMIT 1",
            params![user_id, project_id, category_id, subcategory_id],
            map_link,
        )
        .optional()?;
    Ok(link)
}

fn create_link(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    subcategory_id: Option<i64>,
) -> Result<ExpenseLink> {
    conn.execute(
        "INSERT INTO expense_links (user_id, project_id, category_id, subcategory_id, status) \
         VALUES (?1, ?2, ?3, ?4, 'active')",
        params![user_id, project_id, category_id, subcategory_id],
    )?;
    get_link(conn, conn.last_insert_rowid())
}

pub fn ensure_expense_link(
    conn: &Connection,
    user_id: i64,
    project_id: i64,
    category_id: i64,
    subcategory_id: Option<i64>,
) -> Result<ExpenseLink> {
    match find_active_link(conn, user_id, project_id, category_id, subcategory_id)? {
        Some(link) => Ok(link),
        None => create_link(conn, user_id, project_id, category_id, subcategory_id),
    }
}

// --- Tree ---

#[derive(Debug, Clone, Serialize)]
pub struct TreeSubcategory {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeCategory {
    pub id: i64,
    pub name: String,
    pub subcategories: Vec<TreeSubcategory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeProject {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub categories: Vec<TreeCategory>,
}

/// Active projects with the categories and subcategories reachable through active links.
pub fn project_tree(conn: &Connection, user_id: i64) -> Result<Vec<TreeProject>> {
    let mut tree: Vec<TreeProject> = list_projects(conn, user_id, Some(Status::Active))?
        .into_iter()
        .map(|p| TreeProject {
            id: p.id,
            name: p.name,
            description: p.description,
            categories: Vec::new(),
        })
        .collect();

    let mut stmt = conn.prepare(
        "SELECT l.project_id, c.id, c.name, s.id, s.name, s.status \
         FROM expense_links l \
         JOIN categories c ON c.id = l.category_id \
         LEFT JOIN subcategories s ON s.id = l.subcategory_id \
         WHERE l.user_id = ?1 AND l.status = 'active' AND c.status = 'active' \
         ORDER BY c.name, c.id, s.name",
    )?;
    let rows = stmt.query_map([user_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<i64>>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, Option<Status>>(5)?,
        ))
    })?;

    for row in rows {
        let (project_id, category_id, category_name, sub_id, sub_name, sub_status) = row?;
        let Some(project) = tree.iter_mut().find(|p| p.id == project_id) else {
            continue;
        };
        let category = match project.categories.iter().position(|c| c.id == category_id) {
            Some(idx) => &mut project.categories[idx],
            None => {
                project.categories.push(TreeCategory {
                    id: category_id,
                    name: category_name,
                    subcategories: Vec::new(),
                });
                let last = project.categories.len() - 1;
                &mut project.categories[last]
            }
        };
        if let (Some(id), Some(name), Some(Status::Active)) = (sub_id, sub_name, sub_status) {
            if !category.subcategories.iter().any(|s| s.id == id) {
                category.subcategories.push(TreeSubcategory { id, name });
            }
        }
    }
    Ok(tree)
}
