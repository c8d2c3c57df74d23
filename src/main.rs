//! Thin CLI front end over the `minidb` library. It only maps verbs
//! onto `pager`/`table`/`projection` calls and formats their results.
//! Exit codes: 0 success, 1 operation error, 2 usage error.

use anyhow::{bail, Context, Result};

use minidb::pager::Pager;
use minidb::table::{self, Record, RECORD_SIZE};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: &[String]) -> Result<i32> {
    if args.len() < 3 {
        print_usage(args.first().map(String::as_str).unwrap_or("minidb"));
        return Ok(2);
    }
    let db_path = &args[1];
    let verb = args[2].as_str();
    let rest = &args[3..];

    let mut pager = match Pager::open(db_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {} ({})", e, e.code());
            return Ok(1);
        }
    };

    let outcome = match verb {
        "create" => cmd_create(&mut pager, rest),
        "insert" => cmd_insert(&mut pager, rest),
        "get" => cmd_get(&mut pager, rest),
        "update" => cmd_update(&mut pager, rest),
        "delete" => cmd_delete(&mut pager, rest),
        "scan" => cmd_scan(&mut pager, rest),
        "validate" => cmd_validate(&mut pager, rest),
        "inspect" => cmd_inspect(&mut pager, rest),
        "dump" => cmd_dump(&mut pager, rest),
        "listf" => cmd_listf(&mut pager, rest),
        "getf" => cmd_getf(&mut pager, rest),
        other => {
            eprintln!("unknown verb: {other}");
            return Ok(2);
        }
    };

    match outcome {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e:#}");
            Ok(1)
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("usage: {prog} <db-path> <verb> [args...]");
    eprintln!("verbs: create <root> | insert <root> <file128> | get <id> | update <id> <file128>");
    eprintln!("       delete <id> | scan <root> | validate <root> | inspect <root>");
    eprintln!("       dump page <n> | dump row <id> | listf <root> <schema> | getf <id> <schema>");
}

fn parse_u32(s: &str, what: &str) -> Result<u32> {
    s.parse::<u32>()
        .with_context(|| format!("{what} must be a non-negative integer, got {s:?}"))
}

fn read_record_file(path: &str) -> Result<Record> {
    let bytes = std::fs::read(path).with_context(|| format!("reading record file {path}"))?;
    if bytes.len() != RECORD_SIZE {
        bail!(
            "record file {path} must be exactly {RECORD_SIZE} bytes, got {}",
            bytes.len()
        );
    }
    let mut record = [0_u8; RECORD_SIZE];
    record.copy_from_slice(&bytes);
    Ok(record)
}

fn cmd_create(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [root] = args else { bail!("usage: create <root>") };
    let root = parse_u32(root, "root")?;
    table::create(pager, root).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    println!("created table at root page {root}");
    Ok(())
}

fn cmd_insert(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [root, file] = args else {
        bail!("usage: insert <root> <file128>")
    };
    let root = parse_u32(root, "root")?;
    let record = read_record_file(file)?;
    let id = table::insert(pager, root, &record).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    println!("0x{id:08x}");
    Ok(())
}

fn cmd_get(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [id] = args else { bail!("usage: get <id>") };
    let id = parse_record_id(id)?;
    let record = table::get(pager, id).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    println!("{}", hex::encode(record));
    Ok(())
}

fn cmd_update(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [id, file] = args else {
        bail!("usage: update <id> <file128>")
    };
    let id = parse_record_id(id)?;
    let record = read_record_file(file)?;
    table::update(pager, id, &record).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    println!("updated 0x{id:08x}");
    Ok(())
}

fn cmd_delete(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [id] = args else { bail!("usage: delete <id>") };
    let id = parse_record_id(id)?;
    table::delete(pager, id).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    println!("deleted 0x{id:08x}");
    Ok(())
}

fn cmd_scan(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [root] = args else { bail!("usage: scan <root>") };
    let root = parse_u32(root, "root")?;
    table::scan(pager, root, |record, id| {
        println!("0x{id:08x} {}", hex::encode(record));
        0
    })
    .map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    Ok(())
}

fn cmd_validate(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [root] = args else {
        bail!("usage: validate <root>")
    };
    let root = parse_u32(root, "root")?;
    table::validate_all(pager, root).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    println!("ok");
    Ok(())
}

fn cmd_inspect(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [root] = args else {
        bail!("usage: inspect <root>")
    };
    let root = parse_u32(root, "root")?;
    println!("pager: page_size={} page_count={}", pager.page_size(), pager.page_count());
    let mut page_no = root;
    loop {
        let mut buf = vec![0_u8; pager.page_size() as usize];
        pager.read(page_no, &mut buf).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
        minidb::leaf::validate(&buf).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
        println!(
            "page {page_no}: capacity={} used_count={} next_page={}",
            minidb::leaf::capacity(&buf),
            minidb::leaf::used_count(&buf),
            minidb::leaf::next_page(&buf),
        );
        let next = minidb::leaf::next_page(&buf);
        if next == 0 {
            break;
        }
        page_no = next;
    }
    Ok(())
}

fn cmd_dump(pager: &mut Pager, args: &[String]) -> Result<()> {
    match args {
        [kind, n] if kind == "page" => {
            let page_no = parse_u32(n, "page")?;
            let mut buf = vec![0_u8; pager.page_size() as usize];
            pager.read(page_no, &mut buf).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
            println!("{}", hex::encode(buf));
            Ok(())
        }
        [kind, n] if kind == "row" => {
            let id = parse_record_id(n)?;
            let record = table::get(pager, id).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
            println!("{}", hex::encode(record));
            Ok(())
        }
        _ => bail!("usage: dump page <n> | dump row <id>"),
    }
}

fn cmd_listf(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [root, schema] = args else {
        bail!("usage: listf <root> <schema>")
    };
    let root = parse_u32(root, "root")?;
    let fields = minidb::projection::parse_schema(schema)
        .map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    table::scan(pager, root, |record, id| {
        let projected = minidb::projection::project_record(record, &fields);
        let rendered: Vec<String> = projected.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("0x{id:08x} {}", rendered.join(" "));
        0
    })
    .map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    Ok(())
}

fn cmd_getf(pager: &mut Pager, args: &[String]) -> Result<()> {
    let [id, schema] = args else {
        bail!("usage: getf <id> <schema>")
    };
    let id = parse_record_id(id)?;
    let fields = minidb::projection::parse_schema(schema)
        .map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    let record = table::get(pager, id).map_err(|e| anyhow::anyhow!("{e} ({})", e.code()))?;
    let projected = minidb::projection::project_record(&record, &fields);
    for (k, v) in projected {
        println!("{k}={v}");
    }
    Ok(())
}

fn parse_record_id(s: &str) -> Result<u32> {
    if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex_digits, 16).with_context(|| format!("invalid record id {s:?}"))
    } else {
        s.parse::<u32>().with_context(|| format!("invalid record id {s:?}"))
    }
}
