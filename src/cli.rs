use crate::commands::checkout::{self as checkout_cmd, CheckoutState, ItemView};
use crate::commands::config::{get_config_path, init_config_manager, load_config, save_config};
use crate::commands::menu::{self as menu_cmd, MenuState};
use crate::models::config::AppConfig;
use crate::models::menu::MenuRecord;
use crate::models::region::Region;
use crate::services::backend::MenuServer;
use crate::services::config::ConfigManager;
use chrono::{Local, TimeZone};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "kiosk-checkout",
    about = "Cafeteria self-checkout kiosk controller",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file to use instead of the per-user one
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the dishes on a tray photo
    Scan(ScanArgs),
    /// Search the menu by field, e.g. `search display_name カレー`
    Search {
        field: String,
        #[arg(num_args = 1.., trailing_var_arg = true)]
        value: Vec<String>,
    },
    /// Recently ordered menus
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Password-gated maintenance
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Show or initialise the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Photo of the tray (JPEG or PNG)
    pub image: PathBuf,

    /// Correct the result line by line before paying
    #[arg(short, long)]
    pub interactive: bool,

    /// Confirm the order right after the scan
    #[arg(long)]
    pub submit: bool,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    List,
    /// Look a menu up by display name and record it as ordered
    Add {
        #[arg(num_args = 1.., trailing_var_arg = true)]
        name: Vec<String>,
    },
    Remove {
        field: String,
        #[arg(num_args = 1.., trailing_var_arg = true)]
        value: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum AdminCommand {
    Verify { password: String },
    ResetCache { password: String },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    Path,
    Show,
    /// Write the defaults to the config file
    Init,
}

/// Configuration from `--config` or the per-user file
pub fn resolve_config(cli: &Cli) -> Result<AppConfig, String> {
    match &cli.config {
        Some(path) => ConfigManager::load_file(path).map_err(|e| e.to_string()),
        None => load_config(&init_config_manager()?),
    }
}

pub async fn dispatch(cli: Cli, config: AppConfig) -> Result<(), String> {
    match cli.command {
        Commands::Scan(args) => scan(args, &config).await,
        Commands::Search { field, value } => {
            let state = menu_state(&config)?;
            let records = menu_cmd::search_menu(field, value.join(" "), &state).await?;
            print_records(&records);
            Ok(())
        }
        Commands::Cache(command) => cache(command, &config).await,
        Commands::Admin(command) => admin(command, &config).await,
        Commands::Config(command) => config_command(command, &config),
    }
}

fn menu_state(config: &AppConfig) -> Result<MenuState, String> {
    Ok(MenuState(MenuServer::new(&config.server).map_err(|e| e.to_string())?))
}

async fn cache(command: CacheCommand, config: &AppConfig) -> Result<(), String> {
    let state = menu_state(config)?;
    let records = match command {
        CacheCommand::List => menu_cmd::get_menu_cache(&state).await?,
        CacheCommand::Add { name } => {
            let name = name.join(" ");
            let hits = menu_cmd::search_menu("display_name".into(), name.clone(), &state).await?;
            let record = hits
                .into_iter()
                .next()
                .ok_or_else(|| format!("no menu found for '{}'", name))?;
            menu_cmd::add_menu_cache(record, &state).await?
        }
        CacheCommand::Remove { field, value } => {
            menu_cmd::remove_menu_cache(field, value.join(" "), &state).await?
        }
    };
    print_records(&records);
    Ok(())
}

async fn admin(command: AdminCommand, config: &AppConfig) -> Result<(), String> {
    let state = menu_state(config)?;
    match command {
        AdminCommand::Verify { password } => {
            let ok = menu_cmd::verify_admin_password(password, &state).await?;
            println!("{}", if ok { "password accepted" } else { "password rejected" });
        }
        AdminCommand::ResetCache { password } => {
            let ok = menu_cmd::reset_menu_cache(password, &state).await?;
            println!("{}", if ok { "menu cache reset" } else { "server refused the reset" });
        }
    }
    Ok(())
}

fn config_command(command: ConfigCommand, config: &AppConfig) -> Result<(), String> {
    match command {
        ConfigCommand::Path => println!("{}", get_config_path(&init_config_manager()?)?),
        ConfigCommand::Show => println!(
            "{}",
            serde_json::to_string_pretty(config).map_err(|e| e.to_string())?
        ),
        ConfigCommand::Init => {
            let state = init_config_manager()?;
            save_config(&state, config.clone())?;
            println!("wrote {}", get_config_path(&state)?);
        }
    }
    Ok(())
}

async fn scan(args: ScanArgs, config: &AppConfig) -> Result<(), String> {
    let state = CheckoutState::connect(config).await?;
    let report = checkout_cmd::scan_image(args.image, &state).await?;
    let scanned_at = Local
        .timestamp_millis_opt(report.scanned_at)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    println!(
        "{} detected {} item(s) in {:.2}s",
        scanned_at, report.items, report.elapsed_secs
    );
    if let Some(voice) = &report.voice {
        println!("voice: {}", voice.text);
    }
    print_items(&checkout_cmd::list_items(&state).await?);
    print_totals(&state).await?;

    if args.interactive {
        repl(&state).await?;
    } else if args.submit {
        println!("next: {}", checkout_cmd::submit_order(&state).await?);
    }
    Ok(())
}

/// Line-editing commands available after a scan
#[derive(Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct ReplLine {
    #[command(subcommand)]
    command: ReplCommand,
}

#[derive(Subcommand)]
enum ReplCommand {
    /// Show the list
    List,
    /// Add a menu by name: `add <price> <name>`
    Add {
        price: String,
        #[arg(num_args = 1.., trailing_var_arg = true)]
        name: Vec<String>,
    },
    /// Replace the selected row: `edit <price> <name>`
    Edit {
        price: String,
        #[arg(num_args = 1.., trailing_var_arg = true)]
        name: Vec<String>,
    },
    /// Select row n
    Select { row: usize },
    /// Click the photo at a point
    Click { x: f64, y: f64 },
    /// Delete row n and its box
    Del { row: usize },
    /// Delete only the box of row n
    Unbox { row: usize },
    /// Move/resize the box of row n
    Move {
        row: usize,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Drag the box of row n by a delta
    Drag {
        row: usize,
        #[arg(allow_negative_numbers = true)]
        dx: f64,
        #[arg(allow_negative_numbers = true)]
        dy: f64,
    },
    /// Resize the box of row n from its bottom-right corner
    Resize { row: usize, width: f64, height: f64 },
    /// Name suggestions
    Suggest {
        #[arg(num_args = 1.., trailing_var_arg = true)]
        query: Vec<String>,
    },
    /// Recently ordered menus
    Recent,
    /// Replace row n with entry m of the recent list
    Pick { row: usize, entry: usize },
    Total,
    Submit,
    Cancel,
    Quit,
}

async fn repl(state: &CheckoutState) -> Result<(), String> {
    println!("commands: list add edit select click del unbox move drag resize suggest recent pick total submit cancel quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
            return Ok(());
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        let command = match ReplLine::try_parse_from(words) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match run_line(command, state).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Done) => return Ok(()),
            Err(e) => println!("error: {}", e),
        }
    }
}

enum Flow {
    Continue,
    Done,
}

async fn row(state: &CheckoutState, row: usize) -> Result<ItemView, String> {
    let items = checkout_cmd::list_items(state).await?;
    row.checked_sub(1)
        .and_then(|index| items.get(index).cloned())
        .ok_or_else(|| format!("no row {}", row))
}

async fn run_line(command: ReplCommand, state: &CheckoutState) -> Result<Flow, String> {
    match command {
        ReplCommand::List => print_items(&checkout_cmd::list_items(state).await?),
        ReplCommand::Add { price, name } => {
            checkout_cmd::add_manual_item(name.join(" "), price, state).await?;
            print_items(&checkout_cmd::list_items(state).await?);
        }
        ReplCommand::Edit { price, name } => {
            checkout_cmd::edit_selected_item(name.join(" "), price, state).await?;
            print_items(&checkout_cmd::list_items(state).await?);
        }
        ReplCommand::Select { row: n } => {
            let view = row(state, n).await?;
            checkout_cmd::select_item(view.id, state).await?;
            println!("selected {}", view.item.caption());
        }
        ReplCommand::Click { x, y } => {
            let hit = state.0.lock().await.sync().regions().hit_test(x, y);
            match hit {
                Some(region) => match checkout_cmd::click_region(region, state).await? {
                    Some(item) => println!("{} -> {}", region, item),
                    None => println!("{} has no item", region),
                },
                None => println!("no box at ({}, {})", x, y),
            }
        }
        ReplCommand::Del { row: n } => {
            let view = row(state, n).await?;
            checkout_cmd::delete_item(view.id, state).await?;
            print_items(&checkout_cmd::list_items(state).await?);
        }
        ReplCommand::Unbox { row: n } => {
            let view = row(state, n).await?;
            let region = view.region_id.ok_or_else(|| format!("row {} has no box", n))?;
            checkout_cmd::delete_region(region, state).await?;
        }
        ReplCommand::Move {
            row: n,
            x,
            y,
            width,
            height,
        } => {
            let view = row(state, n).await?;
            let region = view.region_id.ok_or_else(|| format!("row {} has no box", n))?;
            checkout_cmd::move_region(region, Region::new(x, y, width, height), state).await?;
        }
        ReplCommand::Drag { row: n, dx, dy } => {
            let view = row(state, n).await?;
            let region = view.region_id.ok_or_else(|| format!("row {} has no box", n))?;
            checkout_cmd::drag_region(region, dx, dy, state).await?;
            print_items(&checkout_cmd::list_items(state).await?);
        }
        ReplCommand::Resize { row: n, width, height } => {
            let view = row(state, n).await?;
            let region = view.region_id.ok_or_else(|| format!("row {} has no box", n))?;
            checkout_cmd::resize_region(region, width, height, state).await?;
            print_items(&checkout_cmd::list_items(state).await?);
        }
        ReplCommand::Suggest { query } => {
            if let Some(suggestions) = checkout_cmd::suggest_menu(query.join(" "), state).await? {
                for option in &suggestions.options {
                    println!("  {}", option);
                }
                if let Some(price) = suggestions.autofill_price {
                    println!("  price: {}", price);
                }
            }
        }
        ReplCommand::Recent => print_records(&checkout_cmd::recent_menus(state).await?),
        ReplCommand::Pick { row: n, entry } => {
            let view = row(state, n).await?;
            let record = state
                .0
                .lock()
                .await
                .server()
                .recent_cache()
                .into_iter()
                .nth(entry.saturating_sub(1))
                .ok_or_else(|| format!("no recent entry {}; run `recent` first", entry))?;
            checkout_cmd::apply_cached_menu(view.id, record, state).await?;
            print_items(&checkout_cmd::list_items(state).await?);
        }
        ReplCommand::Total => print_totals(state).await?,
        ReplCommand::Submit => {
            println!("next: {}", checkout_cmd::submit_order(state).await?);
            return Ok(Flow::Done);
        }
        ReplCommand::Cancel => {
            println!("next: {}", checkout_cmd::cancel_order(state).await?);
            return Ok(Flow::Done);
        }
        ReplCommand::Quit => return Ok(Flow::Done),
    }
    Ok(Flow::Continue)
}

fn print_items(items: &[ItemView]) {
    for (index, view) in items.iter().enumerate() {
        let marker = match (view.highlighted, view.selected) {
            (true, _) => '!',
            (false, true) => '*',
            (false, false) => ' ',
        };
        let geometry = view
            .region
            .map(|r| {
                let (open, close) = if view.region_highlighted { ('{', '}') } else { ('[', ']') };
                format!("{}{:.0},{:.0} {:.0}x{:.0}{}", open, r.x, r.y, r.width, r.height, close)
            })
            .unwrap_or_else(|| "[no box]".to_string());
        println!(
            "{}{:>2}. {:<24} ¥{:>5}  {}",
            marker,
            index + 1,
            view.item.caption(),
            view.item.price,
            geometry
        );
    }
}

fn print_records(records: &[MenuRecord]) {
    for (index, record) in records.iter().enumerate() {
        println!("{:>2}. {}  ({})", index + 1, record.option_label(), record.jan_code);
    }
}

async fn print_totals(state: &CheckoutState) -> Result<(), String> {
    let totals = checkout_cmd::get_totals(state).await?;
    println!(
        "total ¥{} for {} item(s), {:.0} kcal, protein {:.1} g",
        totals.total_price, totals.item_count, totals.nutrition.energy, totals.nutrition.protein
    );
    Ok(())
}
