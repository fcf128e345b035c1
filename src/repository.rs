//! Typed CRUD over a region for application entities.

use std::marker::PhantomData;

use crate::error::Result;
use crate::grid::Grid;
use crate::types::{FieldValue, Identity, Record};

/// A type stored as records of one region.
pub trait Entity: Sized {
    const REGION: &'static str;
    const TYPE_NAME: &'static str = Self::REGION;

    fn key(&self) -> Identity;

    /// Record tagged with [`Self::REGION`], [`Self::TYPE_NAME`] and [`Self::key`].
    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self>;
}

pub struct Repository<'g, E> {
    grid: &'g Grid,
    entity: PhantomData<fn() -> E>,
}

impl<'g, E: Entity> Repository<'g, E> {
    pub fn new(grid: &'g Grid) -> Self {
        Self {
            grid,
            entity: PhantomData,
        }
    }

    pub fn save(&self, entity: &E) -> Result<()> {
        self.grid.put(E::REGION, entity.key(), entity.to_record())
    }

    pub fn save_all<'a>(&self, entities: impl IntoIterator<Item = &'a E>) -> Result<usize>
    where
        E: 'a,
    {
        let mut saved = 0;
        for entity in entities {
            self.save(entity)?;
            saved += 1;
        }
        Ok(saved)
    }

    pub fn find_by_id(&self, key: impl Into<Identity>) -> Result<Option<E>> {
        self.grid
            .get(E::REGION, &key.into())?
            .map(|record| E::from_record(&record))
            .transpose()
    }

    pub fn exists_by_id(&self, key: impl Into<Identity>) -> Result<bool> {
        Ok(self.grid.get(E::REGION, &key.into())?.is_some())
    }

    pub fn delete_by_id(&self, key: impl Into<Identity>) -> Result<bool> {
        Ok(self.grid.delete(E::REGION, &key.into())?.is_some())
    }

    pub fn delete(&self, entity: &E) -> Result<bool> {
        self.delete_by_id(entity.key())
    }

    pub fn find_all(&self) -> Result<Vec<E>> {
        self.grid
            .scan(E::REGION)?
            .map(|record| E::from_record(&record))
            .collect()
    }

    /// Entities whose `field` equals `value`, served by an index when the
    /// region declares one.
    pub fn find_by_field(&self, field: &str, value: impl Into<FieldValue>) -> Result<Vec<E>> {
        self.grid
            .find_by_field(E::REGION, field, &value.into())?
            .iter()
            .map(E::from_record)
            .collect()
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.grid.scan(E::REGION)?.len())
    }
}
