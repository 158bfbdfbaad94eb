//! Overdue monitor and reminders

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow_request::BorrowRequest,
        reminder::{NewReminder, Reminder},
        user::Principal,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct RemindersService {
    repository: Repository,
}

impl RemindersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_overdue(&self, as_of: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>> {
        self.repository.borrow_requests.list_overdue(as_of).await
    }

    /// Create a reminder for the requester of `request_id`
    pub async fn notify(&self, request_id: i32) -> AppResult<Reminder> {
        let request = self.repository.borrow_requests.get_by_id(request_id).await?;
        // Requests outlive their requester; there is nobody left to remind
        self.repository.users.get_by_id(request.user_id).await?;

        // The item may have been deleted since; the message then falls back to its id
        let equipment = match self.repository.equipment.get_by_id(request.equipment_id).await {
            Ok(equipment) => Some(equipment),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let reminder = self
            .repository
            .reminders
            .create(&NewReminder::overdue(&request, equipment.as_ref()))
            .await?;

        tracing::info!(
            reminder_id = reminder.id,
            request_id,
            user_id = reminder.user_id,
            "Reminder created"
        );
        Ok(reminder)
    }

    pub async fn list_unseen_for(&self, user_id: i32) -> AppResult<Vec<Reminder>> {
        self.repository.reminders.list_unseen_for(user_id).await
    }

    /// Mark a reminder as seen. Only its recipient may do so.
    pub async fn mark_seen(&self, id: i32, actor: Principal) -> AppResult<Reminder> {
        let reminder = self.repository.reminders.get_by_id(id).await?;
        if reminder.user_id != actor.id {
            return Err(AppError::Authorization("Access denied".to_string()));
        }
        if reminder.seen {
            return Ok(reminder);
        }
        self.repository.reminders.mark_seen(id).await
    }

    /// Remind every overdue requester who has no unseen reminder for that request yet
    pub async fn scan_once(&self, as_of: DateTime<Utc>) -> AppResult<Vec<Reminder>> {
        let overdue = self.list_overdue(as_of).await?;
        let mut created = Vec::new();

        for request in overdue {
            match self.repository.reminders.has_unseen_for_request(request.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(request_id = request.id, error = %e, "Failed to check reminders");
                    continue;
                }
            }

            match self.notify(request.id).await {
                Ok(reminder) => created.push(reminder),
                Err(e) => {
                    tracing::error!(request_id = request.id, error = %e, "Failed to create reminder");
                }
            }
        }

        Ok(created)
    }

    /// Run `scan_once` every `period` in the background
    pub fn spawn_scheduler(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match self.scan_once(Utc::now()).await {
                    Ok(created) if !created.is_empty() => {
                        tracing::info!(count = created.len(), "Overdue reminders sent");
                    }
                    Ok(_) => tracing::debug!("Overdue scan found nothing new"),
                    Err(e) => tracing::error!(error = %e, "Overdue scan failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::services::{
        approvals::ApprovalService,
        test_support::{admin, next_week, seed_equipment, seed_request, seed_user},
    };

    async fn approved_overdue(repo: &Repository, user_id: i32, equipment_id: i32) -> BorrowRequest {
        let due = Utc::now() - ChronoDuration::days(2);
        let request = seed_request(repo, user_id, equipment_id, 1, due).await;
        repo.borrow_requests
            .commit_approval(request.id, Utc::now())
            .await
            .unwrap()
            .request
    }

    #[tokio::test]
    async fn overdue_means_approved_unreturned_and_past_due() {
        let repo = Repository::in_memory();
        let user = seed_user(&repo, "alice").await;
        let item = seed_equipment(&repo, "SN-1", 10).await;
        let monitor = RemindersService::new(repo.clone());

        let late = approved_overdue(&repo, user.id, item.id).await;
        seed_request(&repo, user.id, item.id, 1, Utc::now() - ChronoDuration::days(2)).await;
        let on_time = seed_request(&repo, user.id, item.id, 1, next_week()).await;
        repo.borrow_requests.commit_approval(on_time.id, Utc::now()).await.unwrap();

        let overdue = monitor.list_overdue(Utc::now()).await.unwrap();
        assert_eq!(overdue.iter().map(|r| r.id).collect::<Vec<_>>(), vec![late.id]);

        // Nothing is overdue as of a point before the due date
        let before = late.due_date - ChronoDuration::hours(1);
        assert!(monitor.list_overdue(before).await.unwrap().is_empty());

        ApprovalService::new(repo.clone(), Default::default())
            .return_equipment(late.id, admin())
            .await
            .unwrap();
        assert!(monitor.list_overdue(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_names_the_equipment() {
        let repo = Repository::in_memory();
        let user = seed_user(&repo, "alice").await;
        let item = seed_equipment(&repo, "SN-7", 3).await;
        let request = approved_overdue(&repo, user.id, item.id).await;
        let monitor = RemindersService::new(repo.clone());

        let reminder = monitor.notify(request.id).await.unwrap();
        assert_eq!(reminder.user_id, user.id);
        assert_eq!(reminder.borrow_request_id, Some(request.id));
        assert!(!reminder.seen);
        assert_eq!(
            reminder.message,
            format!(
                "Equipment \"Camera SN-7\" (serial SN-7) was due on {} and has not been returned. Please return it as soon as possible.",
                request.due_date.format("%Y-%m-%d")
            )
        );

        assert!(matches!(monitor.notify(4040).await, Err(AppError::NotFound(_))));

        // The request and the item are left alone
        let after = repo.borrow_requests.get_by_id(request.id).await.unwrap();
        assert_eq!(after.status, request.status);
        assert_eq!(repo.equipment.get_by_id(item.id).await.unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn notify_survives_a_deleted_item() {
        let repo = Repository::in_memory();
        let user = seed_user(&repo, "alice").await;
        let item = seed_equipment(&repo, "SN-7", 3).await;
        let request = approved_overdue(&repo, user.id, item.id).await;
        repo.equipment.delete(item.id).await.unwrap();

        let reminder = RemindersService::new(repo).notify(request.id).await.unwrap();
        assert!(reminder.message.contains(&format!("#{}", item.id)));
    }

    #[tokio::test]
    async fn deleted_requesters_are_not_reminded() {
        let repo = Repository::in_memory();
        let user = seed_user(&repo, "alice").await;
        let item = seed_equipment(&repo, "SN-8", 3).await;
        let request = approved_overdue(&repo, user.id, item.id).await;
        repo.users.delete(user.id).await.unwrap();
        let monitor = RemindersService::new(repo);

        // Still overdue, but nobody to notify
        assert_eq!(monitor.list_overdue(Utc::now()).await.unwrap().len(), 1);
        assert!(matches!(
            monitor.notify(request.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(monitor.scan_once(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_seen_is_owner_only_and_idempotent() {
        let repo = Repository::in_memory();
        let alice = seed_user(&repo, "alice").await;
        let bob = seed_user(&repo, "bob").await;
        let item = seed_equipment(&repo, "SN-1", 3).await;
        let request = approved_overdue(&repo, alice.id, item.id).await;
        let monitor = RemindersService::new(repo);

        let reminder = monitor.notify(request.id).await.unwrap();
        assert_eq!(monitor.list_unseen_for(alice.id).await.unwrap().len(), 1);

        assert!(matches!(
            monitor.mark_seen(reminder.id, bob.principal()).await,
            Err(AppError::Authorization(_))
        ));
        assert!(monitor.mark_seen(reminder.id, alice.principal()).await.unwrap().seen);
        assert!(monitor.mark_seen(reminder.id, alice.principal()).await.unwrap().seen);
        assert!(monitor.list_unseen_for(alice.id).await.unwrap().is_empty());
        assert!(matches!(
            monitor.mark_seen(31_337, alice.principal()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn scan_skips_requests_with_unseen_reminders() {
        let repo = Repository::in_memory();
        let user = seed_user(&repo, "alice").await;
        let item = seed_equipment(&repo, "SN-1", 3).await;
        let request = approved_overdue(&repo, user.id, item.id).await;
        let monitor = RemindersService::new(repo);

        let first = monitor.scan_once(Utc::now()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(monitor.scan_once(Utc::now()).await.unwrap().is_empty());

        // Once seen, the next scan reminds again
        monitor.mark_seen(first[0].id, user.principal()).await.unwrap();
        let again = monitor.scan_once(Utc::now()).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].borrow_request_id, Some(request.id));
    }

    #[tokio::test]
    async fn scheduler_scans_on_start() {
        let repo = Repository::in_memory();
        let user = seed_user(&repo, "alice").await;
        let item = seed_equipment(&repo, "SN-1", 3).await;
        approved_overdue(&repo, user.id, item.id).await;
        let monitor = RemindersService::new(repo);

        let handle = monitor.clone().spawn_scheduler(Duration::from_secs(3600));
        let mut unseen = Vec::new();
        for _ in 0..50 {
            unseen = monitor.list_unseen_for(user.id).await.unwrap();
            if !unseen.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(unseen.len(), 1);
    }
}
