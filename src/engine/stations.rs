//! Lab and station administration, and the availability-tracker mutations
//! not tied to a specific reservation transition.

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

#[derive(Debug, Clone)]
pub struct NewLab {
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub opening_hours: Option<OpeningHours>,
}

#[derive(Debug, Clone)]
pub struct NewStation {
    pub lab_id: Ulid,
    pub code: String,
    pub name: String,
    pub specs: StationSpecs,
}

impl Engine {
    pub fn create_lab(&self, req: NewLab) -> Result<Lab, EngineError> {
        if req.name.len() < MIN_LAB_NAME_LEN {
            return Err(EngineError::Validation("lab name must have at least 3 characters"));
        }
        if req.name.len() > MAX_LAB_NAME_LEN {
            return Err(EngineError::Validation("lab name exceeds 100 characters"));
        }
        if let Some(d) = &req.description
            && d.len() > MAX_DESCRIPTION_LEN
        {
            return Err(EngineError::Validation("description exceeds 500 characters"));
        }
        let lab = Lab {
            id: Ulid::new(),
            name: req.name,
            location: req.location,
            description: req.description,
            capacity: 0,
            opening_hours: req.opening_hours.unwrap_or_default(),
            active: true,
        };
        self.store.insert_lab(lab.clone());
        Ok(lab)
    }

    pub fn set_lab_active(&self, lab_id: Ulid, active: bool) -> Result<Lab, EngineError> {
        self.store
            .update_lab(lab_id, |l| l.active = active)
            .ok_or(EngineError::NotFound(lab_id))
    }

    /// Create a station inside a lab. Codes are stored upper-cased and must
    /// be unique across labs. The owning lab's capacity is recomputed.
    pub fn create_station(&self, req: NewStation) -> Result<Station, EngineError> {
        if self.store.get_lab(&req.lab_id).is_none() {
            return Err(EngineError::NotFound(req.lab_id));
        }
        let code = req.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(EngineError::Validation("station code is required"));
        }
        if self.store.station_by_code(&code).is_some() {
            return Err(EngineError::Validation("station code already exists"));
        }

        let station = Station {
            id: Ulid::new(),
            lab_id: req.lab_id,
            code: code.clone(),
            name: req.name,
            status: StationStatus::Free,
            current_reservation_id: None,
            active: true,
            specs: req.specs,
        };
        self.store.insert_station(station.clone());
        self.recompute_lab_capacity(req.lab_id);

        self.publish(Event::StationCreated {
            station_id: station.id,
            lab_id: station.lab_id,
            code,
        });
        Ok(station)
    }

    /// Remove a station; refused while it still has active reservations.
    pub fn remove_station(&self, station_id: Ulid) -> Result<(), EngineError> {
        let station = self
            .store
            .get_station(&station_id)
            .ok_or(EngineError::NotFound(station_id))?;
        if self.store.has_active_for_station(&station_id) {
            return Err(EngineError::Validation("station has active reservations"));
        }
        self.store.remove_station(&station_id);
        self.recompute_lab_capacity(station.lab_id);
        Ok(())
    }

    pub fn set_station_active(&self, station_id: Ulid, active: bool) -> Result<Station, EngineError> {
        let station = self
            .store
            .update_station(station_id, |s| s.active = active)
            .ok_or(EngineError::NotFound(station_id))?;
        self.publish(Event::StationUpdated {
            station_id,
            status: station.status,
            reason: None,
        });
        Ok(station)
    }

    /// Administrative override: set station status directly, bypassing the
    /// conflict checks. Forcing FREE also clears the back-reference; forcing
    /// RESERVED/OCCUPIED without a matching reservation leaves a mismatch
    /// the self-heal sweep will repair.
    pub fn override_station_status(
        &self,
        station_id: Ulid,
        status: StationStatus,
    ) -> Result<Station, EngineError> {
        let station = self
            .store
            .update_station(station_id, |s| {
                s.status = status;
                if status == StationStatus::Free {
                    s.current_reservation_id = None;
                }
            })
            .ok_or(EngineError::NotFound(station_id))?;
        tracing::warn!(station = %station_id, status = %status, "station status overridden");
        self.publish(Event::StationUpdated {
            station_id,
            status,
            reason: None,
        });
        Ok(station)
    }

    fn recompute_lab_capacity(&self, lab_id: Ulid) {
        let count = self.store.station_count_in_lab(&lab_id);
        self.store.update_lab(lab_id, |l| l.capacity = count);
    }
}
