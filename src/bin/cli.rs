use chrono::NaiveDate;
use lecture_scheduler::availability::{HallAvailability, HallSearchParams};
use lecture_scheduler::demo::seed_directory;
use lecture_scheduler::interval::FreeSlot;
use lecture_scheduler::model::TimetableSlot;
use lecture_scheduler::persistence::{
    HallFilter, MemoryStore, SqliteStore, TimetableReader, TimetableStore,
};
use lecture_scheduler::writer::EntryQuery;
use lecture_scheduler::{
    DayOfWeek, EngineConfig, EntryDraft, SchedulingEngine, SchedulingError, SystemClock,
};
use std::error::Error;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.chars().count() > widths[ci] {
                widths[ci] = cell.chars().count();
            }
        }
    }

    let mut sep = String::new();
    sep.push('+');
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    push_row(&mut out, &widths, headers.iter().copied());
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        push_row(&mut out, &widths, row.iter().map(String::as_str));
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn push_row<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for (ci, cell) in cells.enumerate() {
        out.push(' ');
        out.push_str(cell);
        let pad = widths[ci].saturating_sub(cell.chars().count());
        out.push_str(&" ".repeat(pad));
        out.push_str(" |");
    }
    out.push('\n');
}

fn slot_rows(slots: &[TimetableSlot]) -> Vec<Vec<String>> {
    slots
        .iter()
        .map(|slot| {
            vec![
                slot.id.clone(),
                slot.day_of_week.to_string(),
                slot.interval.to_string(),
                slot.course.code.clone(),
                slot.lecturer.full_name(),
                slot.hall.name.clone(),
                slot.group.name.clone(),
            ]
        })
        .collect()
}

const SLOT_HEADERS: [&str; 7] = ["id", "day", "time", "course", "lecturer", "hall", "group"];

fn format_slots(slots: &[FreeSlot]) -> String {
    if slots.is_empty() {
        return "none".to_string();
    }
    slots
        .iter()
        .map(|slot| format!("{} ({} min)", slot.interval, slot.duration_minutes))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_hall_results(halls: &[HallAvailability]) {
    if halls.is_empty() {
        println!("No halls available.");
        return;
    }
    let rows: Vec<Vec<String>> = halls
        .iter()
        .map(|result| {
            vec![
                result.hall.name.clone(),
                result.hall.building.clone(),
                result.hall.capacity.to_string(),
                format_slots(&result.matching_free_slots),
            ]
        })
        .collect();
    println!(
        "{}",
        render_table(&["hall", "building", "capacity", "matching free slots"], &rows)
    );
}

fn print_error(err: &SchedulingError) {
    match err {
        SchedulingError::Conflict(conflicts) => {
            println!("Rejected: {} conflict(s)", conflicts.len());
            for conflict in conflicts {
                println!("  [{}] {}", conflict.kind, conflict.message);
            }
        }
        SchedulingError::Import(report) => {
            println!("Import rolled back ({} rows).", report.total);
            for row in &report.row_errors {
                println!("  row {}: {}", row.row, row.message);
            }
            for row in &report.conflicts {
                for conflict in &row.conflicts {
                    println!("  row {}: {}", row.row, conflict.message);
                }
            }
        }
        other => println!("Error: {other}"),
    }
}

fn print_help() {
    println!(
        "Commands:\n  help                                                Show this help\n  halls                                               List active halls\n  entries [day]                                       List timetable entries\n  add <day> <start> <end> <course> <lecturer> <hall> <group>\n                                                      Create an entry (ids, times HH:mm)\n  move <id> <day> <start> <end>                       Reschedule an entry\n  delete <id>                                         Delete an entry\n  hall <hallId> [day]                                 Show a hall's day schedule\n  search <day> [start end]                            Find halls free on a day\n  now                                                 Halls free right now\n  lecturer <id> [YYYY-MM-DD]                          Lecturer availability\n  import <csv_path>                                   Bulk import entries from CSV\n  export <csv_path>                                   Write active entries as CSV\n  quit|exit                                           Exit"
    );
}

fn open_store(config: &EngineConfig) -> Result<Arc<dyn TimetableStore>, Box<dyn Error>> {
    match &config.database_path {
        Some(path) => {
            let store = SqliteStore::open(path)?;
            if store.list_halls(&HallFilter::default())?.is_empty() {
                seed_directory(&store)?;
            }
            Ok(Arc::new(store))
        }
        None => {
            let store = MemoryStore::new();
            seed_directory(&store)?;
            Ok(Arc::new(store))
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::from_env()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let store = open_store(&config)?;
    let engine = SchedulingEngine::new(store, Arc::new(SystemClock), &config)?;
    let writer = engine.writer();
    let availability = engine.availability();

    println!("Lecture Scheduler (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "halls" => match engine.store().list_halls(&HallFilter::active()) {
                Ok(halls) => {
                    let rows: Vec<Vec<String>> = halls
                        .iter()
                        .map(|hall| {
                            vec![
                                hall.id.clone(),
                                hall.name.clone(),
                                hall.building.clone(),
                                hall.floor.to_string(),
                                hall.capacity.to_string(),
                                hall.equipment.join(", "),
                            ]
                        })
                        .collect();
                    println!(
                        "{}",
                        render_table(
                            &["id", "name", "building", "floor", "capacity", "equipment"],
                            &rows
                        )
                    );
                }
                Err(e) => println!("Error: {e}"),
            },
            "entries" => {
                let query = EntryQuery {
                    day: args.first().map(|day| day.to_string()),
                    limit: Some("100".into()),
                    ..EntryQuery::default()
                };
                match writer.list_entries(&query) {
                    Ok(page) if page.items.is_empty() => println!("No entries."),
                    Ok(page) => {
                        println!("{}", render_table(&SLOT_HEADERS, &slot_rows(&page.items)));
                        println!("{} of {} entries", page.items.len(), page.total);
                    }
                    Err(e) => print_error(&e),
                }
            }
            "add" => {
                let [day, start, end, course, lecturer, hall, group] = args[..] else {
                    println!("Usage: add <day> <start> <end> <course> <lecturer> <hall> <group>");
                    continue;
                };
                let draft = EntryDraft {
                    day_of_week: Some(day.into()),
                    start_time: Some(start.into()),
                    end_time: Some(end.into()),
                    course_id: Some(course.into()),
                    lecturer_id: Some(lecturer.into()),
                    hall_id: Some(hall.into()),
                    group_id: Some(group.into()),
                    ..EntryDraft::default()
                };
                match writer.create_entry(&draft) {
                    Ok(entry) => println!(
                        "Entry created: {} ({} {})",
                        entry.id, entry.day_of_week, entry.interval
                    ),
                    Err(e) => print_error(&e),
                }
            }
            "move" => {
                let [id, day, start, end] = args[..] else {
                    println!("Usage: move <id> <day> <start> <end>");
                    continue;
                };
                let draft = EntryDraft {
                    day_of_week: Some(day.into()),
                    start_time: Some(start.into()),
                    end_time: Some(end.into()),
                    ..EntryDraft::default()
                };
                match writer.update_entry(id, &draft) {
                    Ok(entry) => println!(
                        "Entry moved: {} ({} {})",
                        entry.id, entry.day_of_week, entry.interval
                    ),
                    Err(e) => print_error(&e),
                }
            }
            "delete" => match args.first() {
                Some(id) => match writer.delete_entry(id) {
                    Ok(()) => println!("Deleted entry {id}."),
                    Err(e) => print_error(&e),
                },
                None => println!("Usage: delete <id>"),
            },
            "hall" => {
                let Some(hall) = args.first() else {
                    println!("Usage: hall <hallId> [day]");
                    continue;
                };
                let day = match args.get(1) {
                    Some(day) => match day.parse::<DayOfWeek>() {
                        Ok(day) => day,
                        Err(e) => {
                            println!("{e}");
                            continue;
                        }
                    },
                    None => availability.today(),
                };
                match availability.hall_day_schedule(hall, day) {
                    Ok(schedule) => {
                        println!("{} on {}", schedule.hall.name, schedule.day);
                        if schedule.occupied.is_empty() {
                            println!("No lectures.");
                        } else {
                            println!(
                                "{}",
                                render_table(&SLOT_HEADERS, &slot_rows(&schedule.occupied))
                            );
                        }
                        println!("Free: {}", format_slots(&schedule.free_slots));
                    }
                    Err(e) => print_error(&e),
                }
            }
            "search" => {
                let params = match args[..] {
                    [day] => HallSearchParams {
                        day: Some(day.into()),
                        ..HallSearchParams::default()
                    },
                    [day, start, end] => HallSearchParams {
                        day: Some(day.into()),
                        start_time: Some(start.into()),
                        end_time: Some(end.into()),
                        ..HallSearchParams::default()
                    },
                    _ => {
                        println!("Usage: search <day> [start end]");
                        continue;
                    }
                };
                let query = params.into_query(availability.today());
                match availability.find_available_halls(&query) {
                    Ok(halls) => {
                        println!("Halls free on {}:", query.day);
                        print_hall_results(&halls);
                    }
                    Err(e) => print_error(&e),
                }
            }
            "now" => match availability.find_available_now() {
                Ok(now) => {
                    println!("Halls free on {} at {}:", now.day, now.time);
                    print_hall_results(&now.halls);
                }
                Err(e) => print_error(&e),
            },
            "lecturer" => {
                let Some(id) = args.first() else {
                    println!("Usage: lecturer <id> [YYYY-MM-DD]");
                    continue;
                };
                match args.get(1) {
                    Some(date_s) => {
                        let date = match NaiveDate::parse_from_str(date_s, "%Y-%m-%d") {
                            Ok(d) => d,
                            Err(_) => {
                                println!("Invalid date (YYYY-MM-DD)");
                                continue;
                            }
                        };
                        match availability.lecturer_date_availability(id, date) {
                            Ok(day) => {
                                println!("{} on {} ({})", day.lecturer.full_name(), day.date, day.day);
                                println!("Free: {}", format_slots(&day.availability.free_slots));
                            }
                            Err(e) => print_error(&e),
                        }
                    }
                    None => match availability.lecturer_weekly_availability(id) {
                        Ok(week) => {
                            println!("{}", week.lecturer.full_name());
                            for (day, detail) in &week.days {
                                println!(
                                    "  {:<9} teaching {}, appointments {}, free {}",
                                    day.as_str(),
                                    detail.teaching.len(),
                                    detail.appointments.len(),
                                    format_slots(&detail.free_slots)
                                );
                            }
                        }
                        Err(e) => print_error(&e),
                    },
                }
            }
            "import" => {
                let Some(path) = args.first() else {
                    println!("Usage: import <csv_path>");
                    continue;
                };
                let file = match File::open(path) {
                    Ok(file) => file,
                    Err(e) => {
                        println!("Error opening {path}: {e}");
                        continue;
                    }
                };
                match writer.import_csv(file) {
                    Ok(summary) => println!(
                        "Imported {} of {} rows.",
                        summary.imported, summary.total
                    ),
                    Err(e) => print_error(&e),
                }
            }
            "export" => {
                let Some(path) = args.first() else {
                    println!("Usage: export <csv_path>");
                    continue;
                };
                let file = match File::create(path) {
                    Ok(file) => file,
                    Err(e) => {
                        println!("Error creating {path}: {e}");
                        continue;
                    }
                };
                match writer.export_csv(file) {
                    Ok(rows) => println!("Exported {rows} rows to {path}."),
                    Err(e) => print_error(&e),
                }
            }
            _ => println!("Unknown command. Type 'help'."),
        }
    }
    Ok(())
}
