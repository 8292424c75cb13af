use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use nvtree_session::{LoadStatus, Session, SessionConfig, SessionError};
use nvtree_store::{Backend, DeviceSet, FileFlash};
use nvtree_tree::{NodeId, TreeError};
use nvtree_types::{BackendKind, KeyClass, Value};
use serde_json::json;

use crate::cli::*;

/// An initialized session bound to the image file named on the command line.
pub struct Workspace {
    session: Session,
    kind: BackendKind,
    unit: u32,
    format: OutputFormat,
}

impl Workspace {
    pub fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("reading {}", path.display()))?,
            None => SessionConfig::default(),
        };
        let image = cli.image.clone();
        let capacity = cli.capacity;
        let devices = DeviceSet::with_builder(move |kind, _unit| {
            Ok(Box::new(FileFlash::open(&image, kind, capacity)?) as Box<dyn Backend>)
        });
        let mut session = Session::new(config, Arc::new(devices))?;
        session.init()?;
        Ok(Self {
            session,
            kind: cli.backend,
            unit: cli.unit,
            format: cli.format.clone(),
        })
    }

    fn json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn load(&mut self) -> anyhow::Result<LoadStatus> {
        let status = self
            .session
            .load(self.kind, self.unit)
            .with_context(|| format!("loading image from {} unit {}", self.kind, self.unit))?;
        if !self.json() {
            match status {
                LoadStatus::Loaded { migrated: true, .. } => {
                    eprintln!("{} legacy image re-sealed with a checksum", "note:".yellow().bold())
                }
                LoadStatus::Blank => eprintln!("{} no image found, starting empty", "note:".yellow().bold()),
                LoadStatus::Loaded { .. } => {}
            }
        }
        Ok(status)
    }

    fn save(&mut self) -> anyhow::Result<()> {
        self.session
            .save(self.kind, self.unit)
            .with_context(|| format!("saving image to {} unit {}", self.kind, self.unit))
    }

    /// Create every group along `path`, returning the last one.
    fn ensure_groups(&mut self, path: &str) -> anyhow::Result<Option<NodeId>> {
        let mut parent = None;
        for name in path.split('.').filter(|n| !n.is_empty()) {
            parent = Some(self.session.add_group(parent, name)?);
        }
        Ok(parent)
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut ws = Workspace::open(&cli)?;
    run(&mut ws, cli.command)
}

fn run(ws: &mut Workspace, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init => cmd_init(ws),
        Command::Print(args) => cmd_print(ws, args),
        Command::Get(args) => cmd_get(ws, args),
        Command::Set(args) => cmd_set(ws, args),
        Command::Mkdir(args) => cmd_mkdir(ws, args),
        Command::Del(args) => cmd_del(ws, args),
        Command::Erase => cmd_erase(ws),
        Command::LiteGet(args) => cmd_lite_get(ws, args),
        Command::LiteSet(args) => cmd_lite_set(ws, args),
        Command::Info => cmd_info(ws),
        Command::Secure(args) => cmd_secure(ws, args),
    }
}

fn cmd_init(ws: &mut Workspace) -> anyhow::Result<()> {
    ws.session.erase(ws.kind, ws.unit)?;
    ws.save()?;
    let (base, _) = ws.session.get_count(ws.kind);
    if ws.json() {
        println!("{}", json!({ "initialized": true, "backend": ws.kind.name(), "unit": ws.unit, "base": base }));
    } else {
        println!(
            "{} Initialized empty image on {} unit {} at {}",
            "✓".green().bold(),
            ws.kind.to_string().cyan(),
            ws.unit,
            format!("0x{base:06x}").bold()
        );
    }
    Ok(())
}

fn cmd_print(ws: &mut Workspace, args: PathArgs) -> anyhow::Result<()> {
    ws.load()?;
    let from = match &args.path {
        Some(path) => Some(ws.session.find(path)?.0),
        None => None,
    };
    if ws.json() {
        let tree = ws.session.tree();
        let mut items = Vec::new();
        for (depth, id) in tree.walk(from.unwrap_or(tree.root())) {
            let item = tree.item(id)?;
            items.push(json!({
                "depth": depth,
                "name": item.name(),
                "kind": item.kind().label(),
                "len": item.len(),
                "value": item.value(),
            }));
        }
        println!("{}", json!({ "total_len": tree.total_len(), "items": items }));
    } else {
        print!("{}", ws.session.print(from)?);
    }
    Ok(())
}

fn cmd_get(ws: &mut Workspace, args: GetArgs) -> anyhow::Result<()> {
    ws.load()?;
    let (id, len) = ws.session.find(&args.path)?;
    let value = ws.session.read(id)?;
    print_value(ws, &args.path, len, value.as_ref());
    Ok(())
}

fn print_value(ws: &Workspace, path: &str, len: u32, value: Option<&Value>) {
    if ws.json() {
        println!("{}", json!({ "path": path, "len": len, "value": value }));
        return;
    }
    match value {
        Some(value) => println!("{} = {}", path.bold(), value.to_string().green()),
        None => println!("{} is a group ({} bytes)", path.bold(), len),
    }
}

fn cmd_set(ws: &mut Workspace, args: SetArgs) -> anyhow::Result<()> {
    let value = Value::parse_tagged(&args.value)?;
    ws.load()?;
    match ws.session.find(&args.path) {
        Ok((id, _)) => ws.session.write(id, &value)?,
        Err(SessionError::Tree(TreeError::NotFound(_))) => {
            let (groups, leaf) = args.path.rsplit_once('.').unwrap_or(("", args.path.as_str()));
            let parent = ws.ensure_groups(groups)?;
            ws.session.add_value(parent, leaf, value.clone())?;
        }
        Err(err) => return Err(err.into()),
    }
    ws.save()?;
    if !ws.json() {
        println!("{} {} = {}", "✓".green().bold(), args.path.bold(), value);
    }
    Ok(())
}

fn cmd_mkdir(ws: &mut Workspace, args: GetArgs) -> anyhow::Result<()> {
    ws.load()?;
    ws.ensure_groups(&args.path)?;
    ws.save()?;
    if !ws.json() {
        println!("{} Created {}", "✓".green().bold(), args.path.bold());
    }
    Ok(())
}

fn cmd_del(ws: &mut Workspace, args: GetArgs) -> anyhow::Result<()> {
    ws.load()?;
    ws.session.del_path(&args.path)?;
    ws.save()?;
    if !ws.json() {
        println!("{} Deleted {}", "✓".green().bold(), args.path.bold());
    }
    Ok(())
}

fn cmd_erase(ws: &mut Workspace) -> anyhow::Result<()> {
    ws.session.erase(ws.kind, ws.unit)?;
    if !ws.json() {
        println!("{} Erased image region on {} unit {}", "✓".green().bold(), ws.kind, ws.unit);
    }
    Ok(())
}

fn cmd_lite_get(ws: &mut Workspace, args: GetArgs) -> anyhow::Result<()> {
    let hit = ws.session.lite_find(ws.kind, ws.unit, &args.path)?;
    print_value(ws, &args.path, hit.len, hit.value.as_ref());
    Ok(())
}

fn cmd_lite_set(ws: &mut Workspace, args: SetArgs) -> anyhow::Result<()> {
    let value = Value::parse_tagged(&args.value)?;
    ws.session.lite_update(ws.kind, ws.unit, &args.path, &value)?;
    if !ws.json() {
        println!("{} {} = {} (in place)", "✓".green().bold(), args.path.bold(), value);
    }
    Ok(())
}

fn cmd_info(ws: &mut Workspace) -> anyhow::Result<()> {
    let status = ws.load()?;
    let (base, _) = ws.session.get_count(ws.kind);
    let config = ws.session.config();
    let tree = ws.session.tree();
    let (present, migrated) = match status {
        LoadStatus::Blank => (false, false),
        LoadStatus::Loaded { migrated, .. } => (true, migrated),
    };
    if ws.json() {
        println!(
            "{}",
            json!({
                "backend": ws.kind.name(),
                "unit": ws.unit,
                "base": base,
                "present": present,
                "migrated": migrated,
                "format": config.format,
                "checksum": config.checksum,
                "pool_size": config.pool_size,
                "items": tree.len(),
                "total_len": tree.total_len(),
                "capacity": tree.capacity(),
                "room": tree.room(),
            })
        );
        return Ok(());
    }
    println!("Image on {} unit {} at 0x{base:06x}", ws.kind.to_string().cyan(), ws.unit);
    if present {
        println!("  Status:   {}", "valid".green());
    } else {
        println!("  Status:   {}", "blank".yellow());
    }
    println!("  Format:   {:?}, checksum {:?}", config.format, config.checksum);
    println!("  Items:    {}", tree.len());
    println!("  Payload:  {} of {} bytes ({} free)", tree.total_len(), tree.capacity(), tree.room());
    println!("  Pool:     {} bytes", config.pool_size);
    Ok(())
}

fn cmd_secure(ws: &mut Workspace, args: SecureArgs) -> anyhow::Result<()> {
    let key = if args.class.eq_ignore_ascii_case("off") {
        None
    } else {
        Some(args.class.parse::<KeyClass>()?)
    };
    ws.load()?;
    ws.session.secure(key);
    ws.save()?;
    if !ws.json() {
        match key {
            Some(key) => println!("{} Image encrypted under {}", "✓".green().bold(), key.to_string().cyan()),
            None => println!("{} Image stored in the clear", "✓".green().bold()),
        }
    }
    Ok(())
}
