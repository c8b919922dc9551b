use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod filter;
mod forms;
mod import;
mod models;
mod report;
mod session;
mod stats;
mod views;

use api::{Gateway, StudentQuery};
use config::Config;
use error::{GatewayError, GENERIC_DELETE_FAILURE, GENERIC_LOAD_FAILURE, GENERIC_SAVE_FAILURE};
use filter::{AttendanceCriteria, GradeCriteria, ListView, StatusFilter, StudentCriteria, StudentDirectory};
use forms::{AttendanceForm, GradeForm, StudentEditForm, StudentForm};
use models::{NewAttendance, NewGrade, NewStudent, NewUser, StudentUpdate, UserRole};
use session::Session;
use stats::DashboardPayloads;
use views::{AssumeYes, Confirm, DeleteOutcome, StdinConfirm};

#[derive(Parser)]
#[command(name = "student-records")]
#[command(about = "Administrative console for the school student-records service", long_about = None)]
struct Cli {
    /// Base URL of the student-records API
    #[arg(long, global = true, env = "STUDENT_RECORDS_API_URL", default_value = config::DEFAULT_API_URL)]
    api_url: String,
    /// Where the login token is kept between runs
    #[arg(long, global = true, env = "STUDENT_RECORDS_SESSION", default_value = config::DEFAULT_SESSION_FILE)]
    session_file: PathBuf,
    #[arg(long, global = true, env = "STUDENT_RECORDS_TIMEOUT_SECS", default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "STUDENT_RECORDS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session token
    Logout,
    /// Create a user account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = UserRole::Student)]
        role: UserRole,
    },
    /// Manage students
    #[command(subcommand)]
    Students(StudentCommand),
    /// Manage attendance records
    #[command(subcommand)]
    Attendance(AttendanceCommand),
    /// Manage grades
    #[command(subcommand)]
    Grades(GradeCommand),
    /// Render the statistics dashboard as markdown
    Dashboard {
        #[arg(long, value_enum, default_value_t = Source::Local)]
        source: Source,
        #[arg(long, default_value_t = stats::DASHBOARD_TREND_DAYS, value_parser = trend_days)]
        days: u32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Bulk-create records from a CSV file
    #[command(subcommand)]
    Import(ImportCommand),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Reduce the raw collections locally
    Local,
    /// Use the gateway's pre-aggregated statistics
    Server,
}

impl Source {
    fn label(self) -> &'static str {
        match self {
            Source::Local => "local",
            Source::Server => "server",
        }
    }
}

#[derive(Args)]
struct StudentFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long = "number")]
    student_number: Option<String>,
    #[arg(long = "class")]
    class_name: Option<String>,
}

#[derive(Subcommand)]
enum StudentCommand {
    /// List students, filtered locally
    List {
        #[command(flatten)]
        filters: StudentFields,
    },
    Get { id: i64 },
    /// Search students on the server
    Search {
        #[command(flatten)]
        query: StudentFields,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long = "number")]
        student_number: String,
        #[arg(long = "class")]
        class_name: String,
    },
    Update {
        id: i64,
        #[command(flatten)]
        fields: StudentFields,
    },
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AttendanceCommand {
    List {
        /// Student name contains
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        date: Option<String>,
        /// Present, Late, Absent or All
        #[arg(long, default_value = "All")]
        status: String,
        /// Only fetch records of this student
        #[arg(long)]
        student_id: Option<i64>,
    },
    Create {
        #[arg(long)]
        student_id: String,
        /// Defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "Present")]
        status: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        status: String,
    },
    Get { id: i64 },
    Delete {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
    /// Today's present/late/absent counts
    Today,
    /// Daily present/late/absent counts
    Trend {
        #[arg(long, default_value_t = stats::DEFAULT_TREND_DAYS, value_parser = trend_days)]
        days: u32,
        #[arg(long, value_enum, default_value_t = Source::Local)]
        source: Source,
    },
    /// Status totals, optionally within a date range
    Summary {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, value_enum, default_value_t = Source::Local)]
        source: Source,
    },
}

#[derive(Subcommand)]
enum GradeCommand {
    List {
        /// Student name contains
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        student_id: Option<i64>,
    },
    Create {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        score: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        score: String,
    },
    Get { id: i64 },
    Delete {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
    /// Students by average score
    Ranking {
        #[arg(long, default_value_t = stats::DEFAULT_RANKING_LIMIT)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = Source::Local)]
        source: Source,
    },
    /// Count, average, highest and lowest score
    Summary {
        #[arg(long, value_enum, default_value_t = Source::Local)]
        source: Source,
    },
}

#[derive(Subcommand)]
enum ImportCommand {
    /// Columns: name, student_number, class_name
    Students {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Columns: student_id, subject, score
    Grades {
        #[arg(long)]
        csv: PathBuf,
    },
}

/// `--days` accepts 1 up to a year of daily points.
fn trend_days(value: &str) -> Result<u32, String> {
    let days: u32 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number of days"))?;
    if (1..=stats::MAX_TREND_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(format!("days must be between 1 and {}", stats::MAX_TREND_DAYS))
    }
}

/// Wraps a gateway failure with the message the user should see.
fn user_error(err: GatewayError, fallback: &str) -> anyhow::Error {
    let message = err.user_message(fallback);
    anyhow::Error::new(err).context(message)
}

fn confirmer(yes: bool) -> Box<dyn Confirm> {
    if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn optional_date(raw: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    raw.map(forms::parse_date).transpose().map_err(Into::into)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::new(&cli.api_url, cli.session_file.clone(), cli.timeout_secs)?;
    let session = Arc::new(
        Session::load(&config.session_file).context("failed to restore the login session")?,
    );
    let gateway = Gateway::new(&config, session.clone()).context("failed to build HTTP client")?;
    info!(api_url = %config.api_url, "gateway configured");

    if let Err(err) = run(cli.command, &gateway).await {
        error!(error = ?err, "command failed");
        let unauthorized = err
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<GatewayError>(), Some(GatewayError::Unauthorized)));
        if unauthorized {
            eprintln!("Your session has ended. Run `student-records login` to sign in again.");
        } else {
            eprintln!("Error: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, gateway: &Gateway) -> anyhow::Result<()> {
    match command {
        Commands::Login { username, password } => {
            if gateway.session().is_authenticated() {
                info!("replacing the existing session");
            }
            let token = gateway
                .login(&username, &password)
                .await
                .map_err(|err| user_error(err, "Login failed. Check the username and password."))?;
            gateway.session().set(token.access_token)?;
            println!("Logged in as {username}.");
        }
        Commands::Logout => {
            if gateway.session().clear()? {
                println!("Logged out.");
            } else {
                println!("No active session.");
            }
        }
        Commands::Register {
            username,
            password,
            role,
        } => {
            let user = gateway
                .register(&NewUser {
                    username,
                    password,
                    role,
                })
                .await
                .map_err(|err| user_error(err, "Registration failed."))?;
            println!("Registered {} ({:?}) with id {}.", user.username, user.role, user.id);
        }
        Commands::Students(command) => students(command, gateway).await?,
        Commands::Attendance(command) => attendance(command, gateway).await?,
        Commands::Grades(command) => grades(command, gateway).await?,
        Commands::Dashboard { source, days, out } => {
            let today = today();
            let stats = load_dashboard(gateway, source, days, today)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            let rendered = report::build_dashboard(&stats, source.label(), today);
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Dashboard written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Import(ImportCommand::Students { csv }) => {
            let summary = import::import_students(gateway, &csv).await?;
            print_import(summary.created, &summary.skipped, "students", &csv);
        }
        Commands::Import(ImportCommand::Grades { csv }) => {
            let summary = import::import_grades(gateway, &csv).await?;
            print_import(summary.created, &summary.skipped, "grades", &csv);
        }
    }
    Ok(())
}

fn print_import(created: usize, skipped: &[(usize, String)], noun: &str, csv: &std::path::Path) {
    println!("Imported {created} {noun} from {}.", csv.display());
    for (line, reason) in skipped {
        println!("- row {line} skipped: {reason}");
    }
}

async fn load_dashboard(
    gateway: &Gateway,
    source: Source,
    days: u32,
    today: NaiveDate,
) -> Result<models::DashboardStats, GatewayError> {
    match source {
        Source::Local => {
            let (students, attendance, grades) = tokio::try_join!(
                gateway.list_students(),
                gateway.list_attendance(None),
                gateway.list_grades(None)
            )?;
            Ok(stats::local_dashboard(&students, &attendance, &grades, today, days))
        }
        Source::Server => {
            let (dashboard, attendance_summary, by_subject, distribution, daily) = tokio::try_join!(
                gateway.dashboard_stats(),
                gateway.attendance_summary(None, None),
                gateway.grades_by_subject(),
                gateway.grade_distribution(),
                gateway.attendance_daily(days)
            )?;
            let payloads = DashboardPayloads {
                dashboard,
                attendance_summary,
                by_subject,
                distribution,
                daily,
            };
            Ok(stats::server_dashboard(&payloads, days, today))
        }
    }
}

async fn students(command: StudentCommand, gateway: &Gateway) -> anyhow::Result<()> {
    match command {
        StudentCommand::List { filters } => {
            let students = gateway
                .list_students()
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            let criteria = StudentCriteria {
                name: filters.name,
                student_number: filters.student_number,
                class_name: filters.class_name,
            };
            let view = ListView::build(&students, &criteria, &StudentDirectory::default());
            print!("{}", views::render_students(&view));
        }
        StudentCommand::Get { id } => {
            let student = gateway
                .get_student(id)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            println!(
                "#{} {} (number {}, class {})",
                student.id, student.name, student.student_number, student.class_name
            );
        }
        StudentCommand::Search { query } => {
            let query = StudentQuery {
                name: query.name,
                student_number: query.student_number,
                class_name: query.class_name,
            };
            let found = gateway
                .search_students(&query)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            let view = ListView::build(&found, &StudentCriteria::default(), &StudentDirectory::default());
            print!("{}", views::render_students(&view));
        }
        StudentCommand::Create {
            name,
            student_number,
            class_name,
        } => {
            let student = NewStudent::try_from(StudentForm {
                name,
                student_number,
                class_name,
            })?;
            let created = gateway
                .create_student(&student)
                .await
                .map_err(|err| user_error(err, GENERIC_SAVE_FAILURE))?;
            println!("Created student #{} {}.", created.id, created.name);
        }
        StudentCommand::Update { id, fields } => {
            let update = StudentUpdate::try_from(StudentEditForm {
                name: fields.name,
                student_number: fields.student_number,
                class_name: fields.class_name,
            })?;
            let updated = gateway
                .update_student(id, &update)
                .await
                .map_err(|err| user_error(err, GENERIC_SAVE_FAILURE))?;
            println!("Updated student #{} {}.", updated.id, updated.name);
        }
        StudentCommand::Delete { id, yes } => {
            let outcome = views::confirm_delete(
                confirmer(yes).as_ref(),
                &format!("Delete student #{id}? This cannot be undone."),
                gateway.delete_student(id),
                gateway.list_students(),
            )
            .await
            .map_err(|err| user_error(err, GENERIC_DELETE_FAILURE))?;
            match outcome {
                DeleteOutcome::Cancelled => println!("Cancelled."),
                DeleteOutcome::Deleted(students) => {
                    println!("Deleted student #{id}.");
                    let view = ListView::build(&students, &StudentCriteria::default(), &StudentDirectory::default());
                    print!("{}", views::render_students(&view));
                }
            }
        }
    }
    Ok(())
}

async fn attendance(command: AttendanceCommand, gateway: &Gateway) -> anyhow::Result<()> {
    match command {
        AttendanceCommand::List {
            student,
            date,
            status,
            student_id,
        } => {
            let criteria = AttendanceCriteria {
                student_name: student,
                date: optional_date(date.as_deref())?,
                status: status.parse::<StatusFilter>()?,
            };
            let (students, records) = views::load_attendance_page(gateway, student_id)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            let directory = StudentDirectory::new(&students);
            let view = ListView::build(&records, &criteria, &directory);
            print!("{}", views::render_attendance(&view, &directory));
        }
        AttendanceCommand::Create {
            student_id,
            date,
            status,
        } => {
            let record = NewAttendance::try_from(AttendanceForm {
                student_id,
                date: date.unwrap_or_else(|| today().to_string()),
                status,
            })?;
            let created = gateway
                .create_attendance(&record)
                .await
                .map_err(|err| user_error(err, GENERIC_SAVE_FAILURE))?;
            println!(
                "Recorded {} for student #{} on {} (id {}).",
                created.status, created.student_id, created.date, created.id
            );
        }
        AttendanceCommand::Update {
            id,
            student_id,
            date,
            status,
        } => {
            let record = NewAttendance::try_from(AttendanceForm {
                student_id,
                date,
                status,
            })?;
            let updated = gateway
                .update_attendance(id, &record)
                .await
                .map_err(|err| user_error(err, GENERIC_SAVE_FAILURE))?;
            println!("Updated attendance #{} to {}.", updated.id, updated.status);
        }
        AttendanceCommand::Get { id } => {
            let record = gateway
                .get_attendance(id)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            println!(
                "#{} student #{} on {}: {}",
                record.id, record.student_id, record.date, record.status
            );
        }
        AttendanceCommand::Today => {
            let records = gateway
                .list_attendance(None)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            let today = today();
            let counts = stats::attendance_on(&records, today);
            println!("Present today ({today}): {}", stats::today_present(&records, today));
            println!("Late {}, Absent {}", counts.late, counts.absent);
        }
        AttendanceCommand::Delete { id, yes } => {
            let outcome = views::confirm_delete(
                confirmer(yes).as_ref(),
                &format!("Delete attendance record #{id}? This cannot be undone."),
                gateway.delete_attendance(id),
                views::load_attendance_page(gateway, None),
            )
            .await
            .map_err(|err| user_error(err, GENERIC_DELETE_FAILURE))?;
            match outcome {
                DeleteOutcome::Cancelled => println!("Cancelled."),
                DeleteOutcome::Deleted((students, records)) => {
                    println!("Deleted attendance record #{id}.");
                    let directory = StudentDirectory::new(&students);
                    let view = ListView::build(&records, &AttendanceCriteria::default(), &directory);
                    print!("{}", views::render_attendance(&view, &directory));
                }
            }
        }
        AttendanceCommand::Trend { days, source } => {
            let today = today();
            let trend = match source {
                Source::Local => {
                    let records = gateway
                        .list_attendance(None)
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::daily_trend(&records, days, today)
                }
                Source::Server => {
                    let payload = gateway
                        .attendance_daily(days)
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::daily_from_payload(&payload, days, today)
                }
            };
            println!("{:<10} {:>7} {:>5} {:>6}", "Date", "Present", "Late", "Absent");
            for point in trend {
                println!(
                    "{:<10} {:>7} {:>5} {:>6}",
                    point.date.to_string(),
                    point.counts.present,
                    point.counts.late,
                    point.counts.absent
                );
            }
        }
        AttendanceCommand::Summary { from, to, source } => {
            let start = optional_date(from.as_deref())?;
            let end = optional_date(to.as_deref())?;
            let counts = match source {
                Source::Local => {
                    let records = gateway
                        .list_attendance(None)
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::attendance_summary(&records, start, end)
                }
                Source::Server => {
                    let payload = gateway
                        .attendance_summary(start, end)
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::status_counts_from_payload(&payload)
                }
            };
            println!(
                "Present {}, Late {}, Absent {} ({} records)",
                counts.present,
                counts.late,
                counts.absent,
                counts.total()
            );
        }
    }
    Ok(())
}

async fn grades(command: GradeCommand, gateway: &Gateway) -> anyhow::Result<()> {
    match command {
        GradeCommand::List {
            student,
            subject,
            student_id,
        } => {
            let criteria = GradeCriteria {
                student_name: student,
                subject,
            };
            let (students, grades) = views::load_grade_page(gateway, student_id)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            let directory = StudentDirectory::new(&students);
            let view = ListView::build(&grades, &criteria, &directory);
            print!("{}", views::render_grades(&view, &directory));
        }
        GradeCommand::Create {
            student_id,
            subject,
            score,
        } => {
            let grade = NewGrade::try_from(GradeForm {
                student_id,
                subject,
                score,
            })?;
            let created = gateway
                .create_grade(&grade)
                .await
                .map_err(|err| user_error(err, GENERIC_SAVE_FAILURE))?;
            println!(
                "Recorded {} {} for student #{} (id {}).",
                created.subject, created.score, created.student_id, created.id
            );
        }
        GradeCommand::Update {
            id,
            student_id,
            subject,
            score,
        } => {
            let grade = NewGrade::try_from(GradeForm {
                student_id,
                subject,
                score,
            })?;
            let updated = gateway
                .update_grade(id, &grade)
                .await
                .map_err(|err| user_error(err, GENERIC_SAVE_FAILURE))?;
            println!("Updated grade #{} to {} {}.", updated.id, updated.subject, updated.score);
        }
        GradeCommand::Get { id } => {
            let grade = gateway
                .get_grade(id)
                .await
                .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
            println!(
                "#{} student #{} {}: {}",
                grade.id, grade.student_id, grade.subject, grade.score
            );
        }
        GradeCommand::Delete { id, yes } => {
            let outcome = views::confirm_delete(
                confirmer(yes).as_ref(),
                &format!("Delete grade #{id}? This cannot be undone."),
                gateway.delete_grade(id),
                views::load_grade_page(gateway, None),
            )
            .await
            .map_err(|err| user_error(err, GENERIC_DELETE_FAILURE))?;
            match outcome {
                DeleteOutcome::Cancelled => println!("Cancelled."),
                DeleteOutcome::Deleted((students, grades)) => {
                    println!("Deleted grade #{id}.");
                    let directory = StudentDirectory::new(&students);
                    let view = ListView::build(&grades, &GradeCriteria::default(), &directory);
                    print!("{}", views::render_grades(&view, &directory));
                }
            }
        }
        GradeCommand::Ranking { limit, source } => {
            let ranking = match source {
                Source::Local => {
                    let (students, grades) = views::load_grade_page(gateway, None)
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::grade_ranking(&grades, &StudentDirectory::new(&students), limit)
                }
                Source::Server => {
                    let payload = gateway
                        .grade_ranking(limit)
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::ranking_from_payload(&payload)
                }
            };
            print!("{}", views::render_ranking(&ranking));
        }
        GradeCommand::Summary { source } => {
            let summary = match source {
                Source::Local => {
                    let grades = gateway
                        .list_grades(None)
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::grade_summary(&grades)
                }
                Source::Server => {
                    let payload = gateway
                        .grade_summary()
                        .await
                        .map_err(|err| user_error(err, GENERIC_LOAD_FAILURE))?;
                    stats::grade_summary_from_payload(&payload)
                }
            };
            let score = |value: Option<u32>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
            println!(
                "{} grades, average {:.1}, highest {}, lowest {}",
                summary.total_grades,
                summary.average_score,
                score(summary.highest),
                score(summary.lowest)
            );
        }
    }
    Ok(())
}
