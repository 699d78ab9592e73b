//! A small campus directory used by the binaries when no database is
//! configured, and by tests.

use crate::model::{Course, Hall, Lecturer, StudentGroup};
use crate::persistence::{DirectoryWriter, StoreResult};

pub fn seed_directory<W: DirectoryWriter + ?Sized>(writer: &W) -> StoreResult<()> {
    let halls = [
        Hall::new("hall-a", "Hall A", "Main Building", 200)
            .with_equipment(["projector", "mic", "whiteboard"]),
        Hall::new("hall-b", "Hall B", "Main Building", 150)
            .with_equipment(["projector", "whiteboard"]),
        Hall::new("lab-1", "Lab 1", "Computing Block", 40)
            .with_equipment(["computers", "projector"]),
        Hall::new("lab-2", "Lab 2", "Computing Block", 40)
            .with_equipment(["computers", "projector"]),
        Hall {
            floor: 1,
            ..Hall::new("seminar-1", "Seminar Room 1", "Science Block", 30)
                .with_equipment(["projector", "whiteboard"])
        },
    ];
    for hall in halls {
        writer.upsert_hall(hall)?;
    }

    writer.upsert_lecturer(Lecturer::new("lec-1", "Kumara", "Perera", "lecturer1@lecstu.edu"))?;
    writer.upsert_lecturer(Lecturer::new("lec-2", "Nimal", "Silva", "lecturer2@lecstu.edu"))?;
    writer.upsert_lecturer(Lecturer::new("lec-3", "Sachini", "Fernando", "lecturer3@lecstu.edu"))?;

    writer.upsert_course(Course::new("cs2012", "CS2012", "Data Structures & Algorithms"))?;
    writer.upsert_course(Course::new("cs2023", "CS2023", "Database Systems"))?;
    writer.upsert_course(Course::new("it2015", "IT2015", "Web Development"))?;

    writer.upsert_group(
        StudentGroup::new("cs-2024-a", "CS-2024-A", 2024).with_members(["stu-1", "stu-2"]),
    )?;
    writer.upsert_group(StudentGroup::new("it-2024-a", "IT-2024-A", 2024).with_members(["stu-3"]))?;
    Ok(())
}
