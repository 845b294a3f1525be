use serde::Serialize;

use crate::keys::{self, EntityId, QueryKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Create,
    Update,
    Delete,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Create => "create",
            Op::Update => "update",
            Op::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// Delete is a soft delete on the server.
    Teacher(Op),
    TeacherBasicInfo {
        teacher: EntityId,
    },
    TeacherBulkImport,
    /// `teacher` is `None` when the write may touch a teacher the caller
    /// cannot name, such as the previous owner of a reassigned link.
    TutorLink {
        op: Op,
        teacher: Option<EntityId>,
        institution: EntityId,
    },
    TeachingLink {
        op: Op,
        teacher: Option<EntityId>,
        institution: EntityId,
    },
    Subject(Op),
    Classroom(Op),
    StudentRegistration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub invalidate: Vec<QueryKey>,
    pub refetch: Vec<QueryKey>,
}

impl MutationKind {
    pub fn label(&self) -> String {
        match self {
            MutationKind::Teacher(op) => format!("teacher.{}", op.as_str()),
            MutationKind::TeacherBasicInfo { .. } => "teacher.basicInfo.update".to_string(),
            MutationKind::TeacherBulkImport => "teacher.bulkImport".to_string(),
            MutationKind::TutorLink { op, .. } => format!("tutorLink.{}", op.as_str()),
            MutationKind::TeachingLink { op, .. } => format!("teachingLink.{}", op.as_str()),
            MutationKind::Subject(op) => format!("subject.{}", op.as_str()),
            MutationKind::Classroom(op) => format!("classroom.{}", op.as_str()),
            MutationKind::StudentRegistration => "student.register".to_string(),
        }
    }

    pub fn plan(&self) -> InvalidationPlan {
        match self {
            MutationKind::Teacher(_) | MutationKind::TeacherBulkImport => InvalidationPlan {
                invalidate: vec![keys::teachers(), keys::teachers_search(None)],
                refetch: vec![],
            },
            MutationKind::TeacherBasicInfo { teacher } => InvalidationPlan {
                invalidate: vec![
                    keys::teachers(),
                    keys::teacher_details(Some(*teacher)),
                    keys::teacher_basic_info(*teacher),
                ],
                refetch: vec![],
            },
            MutationKind::TutorLink {
                teacher,
                institution,
                ..
            } => {
                let details = keys::teacher_details(*teacher);
                InvalidationPlan {
                    invalidate: vec![
                        details.clone(),
                        keys::teachers(),
                        keys::teacher_classes(Some(*institution)),
                    ],
                    refetch: vec![details],
                }
            }
            MutationKind::TeachingLink {
                teacher,
                institution,
                ..
            } => {
                let details = keys::teacher_details(*teacher);
                InvalidationPlan {
                    invalidate: vec![
                        details.clone(),
                        keys::teachers(),
                        keys::course_subjects(Some(*institution)),
                    ],
                    refetch: vec![details],
                }
            }
            MutationKind::Subject(_) => InvalidationPlan {
                invalidate: vec![keys::subjects()],
                refetch: vec![],
            },
            // Deleting a classroom also ends its tutor and teaching links.
            MutationKind::Classroom(Op::Delete) => InvalidationPlan {
                invalidate: vec![
                    keys::classrooms(),
                    keys::teacher_details(None),
                    keys::teacher_classes(None),
                    keys::course_subjects(None),
                ],
                refetch: vec![],
            },
            MutationKind::Classroom(_) => InvalidationPlan {
                invalidate: vec![keys::classrooms()],
                refetch: vec![],
            },
            MutationKind::StudentRegistration => InvalidationPlan {
                invalidate: vec![keys::students(), keys::classrooms()],
                refetch: vec![],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(keys: &[QueryKey]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn teacher_writes_cover_lists_and_search() {
        for op in [Op::Create, Op::Update, Op::Delete] {
            let plan = MutationKind::Teacher(op).plan();
            assert_eq!(names(&plan.invalidate), ["teachers", "teachers-search"]);
            assert!(plan.refetch.is_empty());
        }
        assert_eq!(
            MutationKind::TeacherBulkImport.plan(),
            MutationKind::Teacher(Op::Create).plan()
        );
    }

    #[test]
    fn basic_info_targets_one_teacher() {
        let plan = MutationKind::TeacherBasicInfo {
            teacher: EntityId::new(9),
        }
        .plan();
        assert_eq!(
            names(&plan.invalidate),
            ["teachers", "teacher-details:9", "teacher-basic-info:9"]
        );
    }

    #[test]
    fn tutor_link_refetches_the_teacher_details() {
        let plan = MutationKind::TutorLink {
            op: Op::Create,
            teacher: Some(EntityId::new(42)),
            institution: EntityId::new(1),
        }
        .plan();
        assert_eq!(
            names(&plan.invalidate),
            ["teacher-details:42", "teachers", "teacher-classes:1"]
        );
        assert_eq!(names(&plan.refetch), ["teacher-details:42"]);

        let reassigned = MutationKind::TutorLink {
            op: Op::Update,
            teacher: None,
            institution: EntityId::new(1),
        }
        .plan();
        assert_eq!(
            names(&reassigned.invalidate),
            ["teacher-details", "teachers", "teacher-classes:1"]
        );
        assert_eq!(names(&reassigned.refetch), ["teacher-details"]);
    }

    #[test]
    fn teaching_link_without_teacher_covers_all_details() {
        let plan = MutationKind::TeachingLink {
            op: Op::Delete,
            teacher: None,
            institution: EntityId::new(1),
        }
        .plan();
        assert_eq!(
            names(&plan.invalidate),
            ["teacher-details", "teachers", "course-subjects:1"]
        );
        assert_eq!(names(&plan.refetch), ["teacher-details"]);

        let narrowed = MutationKind::TeachingLink {
            op: Op::Create,
            teacher: Some(EntityId::new(5)),
            institution: EntityId::new(1),
        }
        .plan();
        // Narrower prefix, still covered by the broad one.
        assert!(narrowed.refetch[0].starts_with(&plan.refetch[0]));
    }

    #[test]
    fn catalog_writes_invalidate_their_family() {
        assert_eq!(
            names(&MutationKind::Subject(Op::Update).plan().invalidate),
            ["subjects"]
        );
        assert_eq!(
            names(&MutationKind::Classroom(Op::Update).plan().invalidate),
            ["classrooms"]
        );
        assert_eq!(
            names(&MutationKind::Classroom(Op::Delete).plan().invalidate),
            ["classrooms", "teacher-details", "teacher-classes", "course-subjects"]
        );
        assert_eq!(
            names(&MutationKind::StudentRegistration.plan().invalidate),
            ["students", "classrooms"]
        );
    }
}
