//! User commands - the account lifecycle operations

use clap::{Args, Subcommand};
use serde_json::{json, Value};

use crate::domain::user::UserRepository;
use crate::domain::DomainError;
use crate::infrastructure::user::{
    CreateUserRequest, ListUsersRequest, PasswordHasher, UpdateUserRequest, UserService,
};

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user
    CreateUser(CreateUserArgs),

    /// Show a live user
    GetUser {
        id: String,
    },

    /// Change profile fields of a user
    UpdateUser(UpdateUserArgs),

    /// Soft-delete a user
    DeleteUser {
        id: String,
    },

    /// Soft-delete several users, reporting failures per id
    BatchDelete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Enable (1) or disable (0) a user
    SetStatus {
        id: String,
        status: i8,
        #[arg(long)]
        update_by: Option<String>,
    },

    /// Replace a user's password
    ResetPassword {
        id: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        update_by: Option<String>,
    },

    /// Report whether a live user holds an account name
    CheckAccount {
        account: String,
    },

    /// Population and registration counts
    Stats {
        #[arg(long)]
        tenant_id: Option<String>,
    },

    /// Filtered, paginated listing, newest first
    ListUsers(ListUsersArgs),
}

/// Arguments for the create-user command
#[derive(Args, Clone, Debug)]
pub struct CreateUserArgs {
    #[arg(long)]
    pub account: String,
    #[arg(long)]
    pub password: String,
    #[arg(long)]
    pub nickname: Option<String>,
    #[arg(long)]
    pub remark: Option<String>,
    #[arg(long)]
    pub dept_id: Option<String>,
    #[arg(long)]
    pub post_ids: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub mobile: Option<String>,
    /// 0 = female, 1 = male
    #[arg(long)]
    pub sex: Option<i8>,
    #[arg(long)]
    pub avatar: Option<String>,
    /// 0 = disabled, 1 = enabled
    #[arg(long)]
    pub status: Option<i8>,
    #[arg(long)]
    pub tenant_id: Option<String>,
    #[arg(long)]
    pub create_by: Option<String>,
}

/// Arguments for the update-user command; omitted fields stay unchanged
#[derive(Args, Clone, Debug)]
pub struct UpdateUserArgs {
    pub id: String,
    #[arg(long)]
    pub nickname: Option<String>,
    #[arg(long)]
    pub remark: Option<String>,
    #[arg(long)]
    pub dept_id: Option<String>,
    #[arg(long)]
    pub post_ids: Option<String>,
    /// An empty value clears the email
    #[arg(long)]
    pub email: Option<String>,
    /// An empty value clears the mobile
    #[arg(long)]
    pub mobile: Option<String>,
    #[arg(long)]
    pub sex: Option<i8>,
    #[arg(long)]
    pub avatar: Option<String>,
    #[arg(long)]
    pub status: Option<i8>,
    #[arg(long)]
    pub update_by: Option<String>,
}

/// Arguments for the list-users command
#[derive(Args, Clone, Debug)]
pub struct ListUsersArgs {
    #[arg(long, default_value_t = 1)]
    pub page: i64,
    #[arg(long, default_value_t = 15)]
    pub page_size: i64,
    #[arg(long)]
    pub account: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub mobile: Option<String>,
    #[arg(long)]
    pub status: Option<i8>,
    #[arg(long)]
    pub dept_id: Option<String>,
    #[arg(long)]
    pub tenant_id: Option<String>,
    /// Inclusive, YYYY-MM-DD
    #[arg(long)]
    pub start_date: Option<String>,
    /// Inclusive, YYYY-MM-DD
    #[arg(long)]
    pub end_date: Option<String>,
}

impl From<CreateUserArgs> for CreateUserRequest {
    fn from(args: CreateUserArgs) -> Self {
        Self {
            account: args.account,
            password: args.password,
            nickname: args.nickname,
            remark: args.remark,
            dept_id: args.dept_id,
            post_ids: args.post_ids,
            email: args.email,
            mobile: args.mobile,
            sex: args.sex,
            avatar: args.avatar,
            status: args.status,
            tenant_id: args.tenant_id,
            create_by: args.create_by,
        }
    }
}

impl From<UpdateUserArgs> for UpdateUserRequest {
    fn from(args: UpdateUserArgs) -> Self {
        Self {
            id: args.id,
            nickname: args.nickname,
            remark: args.remark,
            dept_id: args.dept_id,
            post_ids: args.post_ids,
            email: args.email,
            mobile: args.mobile,
            sex: args.sex,
            avatar: args.avatar,
            status: args.status,
            update_by: args.update_by,
        }
    }
}

impl From<ListUsersArgs> for ListUsersRequest {
    fn from(args: ListUsersArgs) -> Self {
        Self {
            page: args.page,
            page_size: args.page_size,
            account: args.account,
            email: args.email,
            mobile: args.mobile,
            status: args.status,
            dept_id: args.dept_id,
            tenant_id: args.tenant_id,
            start_date: args.start_date,
            end_date: args.end_date,
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value)
        .map_err(|e| DomainError::internal(format!("Failed to encode output: {}", e)))
}

/// Run one user command against `service` and render its result
pub async fn execute<R, H>(
    service: &UserService<R, H>,
    command: UserCommand,
) -> Result<Value, DomainError>
where
    R: UserRepository,
    H: PasswordHasher,
{
    match command {
        UserCommand::CreateUser(args) => to_json(&service.create_user(args.into()).await?),
        UserCommand::GetUser { id } => to_json(&service.get_user(&id).await?),
        UserCommand::UpdateUser(args) => to_json(&service.update_user(args.into()).await?),
        UserCommand::DeleteUser { id } => {
            service.delete_user(&id).await?;
            Ok(json!({ "id": id, "deleted": true }))
        }
        UserCommand::BatchDelete { ids } => to_json(&service.batch_delete_users(&ids).await?),
        UserCommand::SetStatus {
            id,
            status,
            update_by,
        } => {
            service.change_user_status(&id, status, update_by).await?;
            Ok(json!({ "id": id, "status": status }))
        }
        UserCommand::ResetPassword {
            id,
            password,
            update_by,
        } => {
            service.reset_password(&id, &password, update_by).await?;
            Ok(json!({ "id": id, "password_reset": true }))
        }
        UserCommand::CheckAccount { account } => {
            let exists = service.check_account_exists(&account).await?;
            Ok(json!({ "account": account, "exists": exists }))
        }
        UserCommand::Stats { tenant_id } => {
            to_json(&service.get_user_stats(tenant_id.as_deref()).await?)
        }
        UserCommand::ListUsers(args) => to_json(&service.list_users(args.into()).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::user::{Argon2Hasher, InMemoryUserRepository};
    use std::sync::Arc;

    fn create_service() -> UserService<InMemoryUserRepository, Argon2Hasher> {
        UserService::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(Argon2Hasher::with_params(8 * 1024, 1, 1).unwrap()),
        )
    }

    fn create_args(account: &str) -> CreateUserArgs {
        CreateUserArgs {
            account: account.to_string(),
            password: "pw1".to_string(),
            nickname: None,
            remark: None,
            dept_id: None,
            post_ids: None,
            email: None,
            mobile: None,
            sex: None,
            avatar: None,
            status: None,
            tenant_id: None,
            create_by: None,
        }
    }

    #[tokio::test]
    async fn test_create_output_hides_password_hash() {
        let service = create_service();

        let output = execute(&service, UserCommand::CreateUser(create_args("alice")))
            .await
            .unwrap();

        assert_eq!(output["account"], "alice");
        assert_eq!(output["status"], "enabled");
        assert!(output.get("password_hash").is_none());
        assert!(!output.to_string().contains("argon2"));
    }

    #[tokio::test]
    async fn test_check_account_and_delete_output() {
        let service = create_service();
        let created = execute(&service, UserCommand::CreateUser(create_args("alice")))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let output = execute(
            &service,
            UserCommand::CheckAccount {
                account: "alice".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(output, json!({ "account": "alice", "exists": true }));

        let output = execute(&service, UserCommand::DeleteUser { id: id.clone() })
            .await
            .unwrap();
        assert_eq!(output["deleted"], true);

        let err = execute(&service, UserCommand::GetUser { id })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_output_carries_paging() {
        let service = create_service();
        execute(&service, UserCommand::CreateUser(create_args("alice")))
            .await
            .unwrap();

        let output = execute(
            &service,
            UserCommand::ListUsers(ListUsersArgs {
                page: 0,
                page_size: 1000,
                account: None,
                email: None,
                mobile: None,
                status: None,
                dept_id: None,
                tenant_id: None,
                start_date: None,
                end_date: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(output["total"], 1);
        assert_eq!(output["page"], 1);
        assert_eq!(output["page_size"], 100);
    }
}
