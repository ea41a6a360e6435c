//! Slot template management.

use slotbook_types::error::TemplateError;
use slotbook_types::id::{StoreId, TemplateId};
use slotbook_types::template::{
    CreateTemplateRequest, Template, TemplateStatus, UpdateTemplateRequest, validate_rules,
};

use crate::repository::template::TemplateRepository;

pub struct TemplateService<T: TemplateRepository> {
    repo: T,
}

impl<T: TemplateRepository> TemplateService<T> {
    pub fn new(repo: T) -> Self {
        Self { repo }
    }

    /// Validate and store a new template, optionally activating it.
    pub async fn create(&self, request: CreateTemplateRequest) -> Result<Template, TemplateError> {
        let name = request.name.trim().to_string();
        validate_rules(&name, &request.rules).map_err(TemplateError::Invalid)?;

        let now = chrono::Utc::now();
        let template = Template {
            id: TemplateId::new(),
            store_id: request.store_id,
            name,
            status: TemplateStatus::Inactive,
            rules: request.rules,
            created_at: now,
            updated_at: now,
        };

        let mut template = self.repo.create(&template).await?;
        tracing::info!(
            store_id = %template.store_id,
            template_id = %template.id,
            name = %template.name,
            "created slot template"
        );

        if request.activate {
            self.repo.activate(&template.store_id, &template.id).await?;
            template.status = TemplateStatus::Active;
            tracing::info!(template_id = %template.id, "activated slot template");
        }

        Ok(template)
    }

    pub async fn get(&self, id: &TemplateId) -> Result<Template, TemplateError> {
        self.repo.get_by_id(id).await?.ok_or(TemplateError::NotFound)
    }

    pub async fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<Template>, TemplateError> {
        Ok(self.repo.list_by_store(store_id).await?)
    }

    pub async fn get_active(&self, store_id: &StoreId) -> Result<Template, TemplateError> {
        self.repo
            .get_active_by_store(store_id)
            .await?
            .ok_or(TemplateError::NotFound)
    }

    /// Apply a partial update. Rules are re-validated as a whole.
    pub async fn update(
        &self,
        id: &TemplateId,
        request: UpdateTemplateRequest,
    ) -> Result<Template, TemplateError> {
        let mut template = self.get(id).await?;

        if let Some(name) = request.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            template.name = name.to_string();
        }
        if let Some(rules) = request.rules.filter(|r| !r.is_empty()) {
            template.rules = rules;
        }
        validate_rules(&template.name, &template.rules).map_err(TemplateError::Invalid)?;

        let activate = request.status == Some(TemplateStatus::Active) && !template.is_active();
        if request.status == Some(TemplateStatus::Inactive) {
            template.status = TemplateStatus::Inactive;
        }
        template.updated_at = chrono::Utc::now();
        self.repo.update(&template).await?;

        if activate {
            self.repo.activate(&template.store_id, id).await?;
            template.status = TemplateStatus::Active;
        }

        tracing::info!(
            store_id = %template.store_id,
            template_id = %id,
            name = %template.name,
            status = %template.status,
            "updated slot template"
        );
        Ok(template)
    }

    /// Remove a template. Slots already generated from it are kept.
    pub async fn delete(&self, id: &TemplateId) -> Result<Template, TemplateError> {
        let template = self.get(id).await?;
        self.repo.delete(id).await?;
        if template.is_active() {
            tracing::warn!(
                store_id = %template.store_id,
                template_id = %id,
                "deleted the active template; store has none until another is activated"
            );
        } else {
            tracing::info!(store_id = %template.store_id, template_id = %id, "deleted slot template");
        }
        Ok(template)
    }

    /// Make `id` the store's only active template.
    pub async fn activate(&self, id: &TemplateId) -> Result<Template, TemplateError> {
        let mut template = self.get(id).await?;
        self.repo.activate(&template.store_id, id).await?;
        template.status = TemplateStatus::Active;
        tracing::info!(
            store_id = %template.store_id,
            template_id = %id,
            "activated slot template"
        );
        Ok(template)
    }
}
