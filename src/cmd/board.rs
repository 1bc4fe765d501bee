//! Board, column and task commands.

use anyhow::{Context, Result, bail};
use boardsync::client::BoardSync;
use boardsync::store::Board;

use crate::{BoardCommands, ColumnCommands, TaskCommands};
use super::{report, require_user};

fn local_board(client: &BoardSync, board_id: &str) -> Result<Board> {
    client
        .boards
        .board_by_id(board_id)
        .with_context(|| {
            format!(
                "Board '{}' not found. Run 'boardsync boards' to list boards.",
                board_id
            )
        })
}

fn print_board(board: &Board) {
    println!();
    println!(
        "{} {}",
        console::style(&board.name).bold().cyan(),
        console::style(format!("({})", board.id)).dim()
    );
    println!(
        "  owner: {}  members: {}",
        board.owner_id,
        if board.member_ids.is_empty() {
            "-".to_string()
        } else {
            board.member_ids.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    );
    for column in &board.columns {
        println!();
        println!(
            "  {} {}",
            console::style(&column.title).bold(),
            console::style(format!("[{}]", column.id)).dim()
        );
        if column.task_ids.is_empty() {
            println!("    {}", console::style("(empty)").dim());
        }
        for task_id in &column.task_ids {
            let Some(task) = board.tasks.get(task_id) else {
                continue;
            };
            let mut line = format!("    - {} {}", task.title, console::style(&task.id).dim());
            if !task.tags.is_empty() {
                let tags: Vec<String> = task.tags.iter().map(|t| format!("#{t}")).collect();
                line.push_str(&format!(" {}", console::style(tags.join(" ")).yellow()));
            }
            if !task.assignee_ids.is_empty() {
                let who: Vec<&str> = task.assignee_ids.iter().map(String::as_str).collect();
                line.push_str(&format!(" @{}", who.join(",@")));
            }
            println!("{line}");
            if let Some(description) = &task.description {
                println!("      {}", console::style(description).dim());
            }
        }
    }
    println!();
}

pub async fn cmd_boards(client: &BoardSync) -> Result<()> {
    let user = require_user(client)?;
    if !client.boards.fetch_remote().await {
        println!("{}", console::style("Remote unreachable, showing cached boards.").dim());
    }
    let boards = client.boards.boards_for_user(&user.id);
    if boards.is_empty() {
        println!("No boards yet. Create one with 'boardsync board create <name>'.");
        return Ok(());
    }
    println!("{:<24} {:<8} {:<6} Name", "Id", "Columns", "Tasks");
    println!("{:<24} {:<8} {:<6} ----", "--", "-------", "-----");
    for board in boards {
        println!(
            "{:<24} {:<8} {:<6} {}",
            board.id,
            board.columns.len(),
            board.tasks.len(),
            board.name
        );
    }
    Ok(())
}

pub async fn cmd_board(client: &BoardSync, command: BoardCommands) -> Result<()> {
    let user = require_user(client)?;
    match command {
        BoardCommands::Create { name } => {
            let id = client.boards.create_board(&name, &user.id).await;
            println!("{} Created board {} ({})", console::style("✓").green(), name, id);
        }
        BoardCommands::Rename { board, name } => {
            let resolution = client.boards.rename_board(&board, &name).await;
            report("Board renamed", &resolution);
        }
        BoardCommands::Delete { board } => {
            let resolution = client.boards.delete_board(&board).await;
            report("Board deleted", &resolution);
        }
        BoardCommands::Invite { board, user, email } => {
            let resolution = match (user, email) {
                (Some(user_id), _) => client.boards.invite_member(&board, &user_id).await,
                (None, Some(email)) => {
                    let resolution = client.boards.invite_member_by_email(&board, &email).await;
                    if !resolution.is_remote() {
                        bail!("Inviting by email needs the remote store, which is unreachable");
                    }
                    resolution
                }
                (None, None) => bail!("Pass --user or --email"),
            };
            report("Member invited", &resolution);
        }
        BoardCommands::Show { board } => {
            client.boards.fetch_remote().await;
            print_board(&local_board(client, &board)?);
        }
    }
    Ok(())
}

pub async fn cmd_column(client: &BoardSync, command: ColumnCommands) -> Result<()> {
    require_user(client)?;
    let boards = &client.boards;
    match command {
        ColumnCommands::Add { board, title } => {
            report("Column added", &boards.add_column(&board, &title).await);
        }
        ColumnCommands::Rename {
            board,
            column,
            title,
        } => {
            report(
                "Column renamed",
                &boards.rename_column(&board, &column, &title).await,
            );
        }
        ColumnCommands::Delete { board, column } => {
            report("Column deleted", &boards.delete_column(&board, &column).await);
        }
        ColumnCommands::Reorder { board, order } => {
            report(
                "Columns reordered",
                &boards.reorder_columns(&board, &order).await,
            );
        }
    }
    Ok(())
}

pub async fn cmd_task(client: &BoardSync, command: TaskCommands) -> Result<()> {
    require_user(client)?;
    let boards = &client.boards;
    match command {
        TaskCommands::Create {
            board,
            column,
            title,
        } => match boards.create_task(&board, &column, &title).await {
            Some(id) => println!(
                "{} Created task {} ({})",
                console::style("✓").green(),
                title,
                id
            ),
            None => bail!("Column '{}' not found on board '{}'", column, board),
        },
        TaskCommands::Rename { board, task, title } => {
            report("Task renamed", &boards.rename_task(&board, &task, &title).await);
        }
        TaskCommands::Describe { board, task, text } => {
            let resolution = boards
                .set_task_description(&board, &task, text.as_deref())
                .await;
            report("Description updated", &resolution);
        }
        TaskCommands::Delete { board, task } => {
            report("Task deleted", &boards.delete_task(&board, &task).await);
        }
        TaskCommands::Move {
            board,
            task,
            to,
            index,
        } => {
            let current = local_board(client, &board)?;
            let from = current
                .column_of(&task)
                .map(|c| c.id.clone())
                .with_context(|| format!("Task '{}' not found on board '{}'", task, board))?;
            let resolution = boards.move_task(&board, &task, &from, &to, index).await;
            report("Task moved", &resolution);
        }
        TaskCommands::Tags { board, task, tags } => {
            report("Tags updated", &boards.set_task_tags(&board, &task, &tags).await);
        }
        TaskCommands::Assign { board, task, users } => {
            let resolution = boards.set_task_assignees(&board, &task, &users).await;
            report("Assignees updated", &resolution);
        }
        TaskCommands::Reorder {
            board,
            column,
            order,
        } => {
            report(
                "Tasks reordered",
                &boards.reorder_tasks(&board, &column, &order).await,
            );
        }
    }
    Ok(())
}
