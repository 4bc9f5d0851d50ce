//! Elevator coordinator: one cabin, one sliding door per floor
//!
//! The cabin and both doors live in one struct so the coordinator can
//! sequence them without references between entities. Every multi-tick
//! motion is a small task enum advanced once per tick; superseding a task is
//! a plain assignment.
//!
//! Summoning works in two phases: the door on the cabin's floor is forced
//! closed and becomes the *watched* door, and only that door's close
//! notification starts the cabin. Close notifications from any other door
//! are discarded.

use crate::config::ServerConfig;
use crate::session::Session;
use log::{debug, info};
use shared::{
    move_towards, move_towards_f32, Aabb, Broadcast, CabinFields, DoorFields, ElevatorLayout,
    EntityId, FieldSet, FieldUpdate, Floor, Role, SyncResult, Vec3, ARRIVAL_EPSILON,
};

/// Observable phase of a sliding door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Closed,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DoorTask {
    Idle,
    Opening,
    Dwelling { until: f64 },
    Closing,
}

#[derive(Debug)]
pub struct ElevatorDoor {
    pub id: EntityId,
    pub floor: Floor,
    pub fields: DoorFields,
    task: DoorTask,
}

impl ElevatorDoor {
    fn new(id: EntityId, floor: Floor) -> Self {
        Self {
            id,
            floor,
            fields: DoorFields::new(Role::Authority),
            task: DoorTask::Idle,
        }
    }

    pub fn slide(&self) -> f32 {
        *self.fields.slide.get()
    }

    pub fn state(&self) -> DoorState {
        match self.task {
            DoorTask::Opening => DoorState::Opening,
            DoorTask::Dwelling { .. } => DoorState::Open,
            DoorTask::Closing => DoorState::Closing,
            DoorTask::Idle if self.slide() > 0.0 => DoorState::Open,
            DoorTask::Idle => DoorState::Closed,
        }
    }

    /// Open, wait, close. Replaces whatever the door was doing.
    fn open(&mut self) -> SyncResult<()> {
        self.task = DoorTask::Opening;
        self.fields.is_open.set(true)
    }

    /// Skips straight to closing from the current pose.
    fn force_close(&mut self) -> SyncResult<()> {
        self.task = DoorTask::Closing;
        self.fields.is_open.set(false)
    }

    /// Advances the running task. Returns true on the tick the door finishes
    /// closing.
    fn advance(&mut self, now: f64, dt: f32, params: &ElevatorParams) -> SyncResult<bool> {
        match self.task {
            DoorTask::Idle => Ok(false),
            DoorTask::Opening => {
                if self.slide_towards(params.slide_distance, dt, params)? {
                    self.task = DoorTask::Dwelling {
                        until: now + params.dwell,
                    };
                }
                Ok(false)
            }
            DoorTask::Dwelling { until } => {
                if now >= until {
                    self.task = DoorTask::Closing;
                    self.fields.is_open.set(false)?;
                }
                Ok(false)
            }
            DoorTask::Closing => {
                if self.slide_towards(0.0, dt, params)? {
                    self.task = DoorTask::Idle;
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    fn slide_towards(&mut self, target: f32, dt: f32, params: &ElevatorParams) -> SyncResult<bool> {
        let mut slide = move_towards_f32(self.slide(), target, params.slide_speed * dt);
        let arrived = (slide - target).abs() < ARRIVAL_EPSILON;
        if arrived {
            slide = target;
        }
        self.fields.slide.set(slide)?;
        Ok(arrived)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CabinMotion {
    Idle(Floor),
    Moving { to: Floor },
}

#[derive(Debug, Clone, Copy)]
struct ElevatorParams {
    slide_distance: f32,
    slide_speed: f32,
    dwell: f64,
    cabin_speed: f32,
}

#[derive(Debug)]
pub struct Elevator {
    pub cabin_id: EntityId,
    pub cabin: CabinFields,
    doors: [ElevatorDoor; 2],
    layout: ElevatorLayout,
    motion: CabinMotion,
    watched: Option<Floor>,
    pending: Option<Floor>,
    occupancy: u32,
    params: ElevatorParams,
}

fn index(floor: Floor) -> usize {
    match floor {
        Floor::Bottom => 0,
        Floor::Top => 1,
    }
}

impl Elevator {
    pub fn new(
        cabin_id: EntityId,
        bottom_door: EntityId,
        top_door: EntityId,
        layout: ElevatorLayout,
        config: &ServerConfig,
    ) -> Self {
        let start = Floor::Bottom;
        Self {
            cabin_id,
            cabin: CabinFields::new(Role::Authority, layout.floor_pose(start)),
            doors: [
                ElevatorDoor::new(bottom_door, Floor::Bottom),
                ElevatorDoor::new(top_door, Floor::Top),
            ],
            layout,
            motion: CabinMotion::Idle(start),
            watched: None,
            pending: None,
            occupancy: 0,
            params: ElevatorParams {
                slide_distance: config.door_slide_distance,
                slide_speed: config.door_slide_speed,
                dwell: config.door_dwell,
                cabin_speed: config.cabin_speed,
            },
        }
    }

    pub fn door(&self, floor: Floor) -> &ElevatorDoor {
        &self.doors[index(floor)]
    }

    fn door_mut(&mut self, floor: Floor) -> &mut ElevatorDoor {
        &mut self.doors[index(floor)]
    }

    pub fn doors(&self) -> impl Iterator<Item = &ElevatorDoor> {
        self.doors.iter()
    }

    pub fn floor_of_door(&self, door: EntityId) -> Option<Floor> {
        self.doors.iter().find(|d| d.id == door).map(|d| d.floor)
    }

    pub fn motion(&self) -> CabinMotion {
        self.motion
    }

    pub fn is_moving(&self) -> bool {
        matches!(self.motion, CabinMotion::Moving { .. })
    }

    /// Floor the cabin is docked at, `None` while moving.
    pub fn current_floor(&self) -> Option<Floor> {
        match self.motion {
            CabinMotion::Idle(floor) => Some(floor),
            CabinMotion::Moving { .. } => None,
        }
    }

    pub fn cabin_position(&self) -> Vec3 {
        *self.cabin.position.get()
    }

    pub fn cabin_volume(&self) -> Aabb {
        self.layout.cabin_volume(self.cabin_position())
    }

    pub fn watched_door(&self) -> Option<Floor> {
        self.watched
    }

    pub fn pending_target(&self) -> Option<Floor> {
        self.pending
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    pub fn player_entered(&mut self) {
        self.occupancy += 1;
    }

    pub fn player_exited(&mut self) {
        self.occupancy = self.occupancy.saturating_sub(1);
    }

    /// Solid volume of a door that is not fully open.
    pub fn door_volume(&self, floor: Floor) -> Option<Aabb> {
        let door = self.door(floor);
        if door.slide() >= self.params.slide_distance {
            return None;
        }
        let closed = self.layout.door_position(floor);
        let center = closed.add(&Vec3::new(-door.slide(), self.layout.cabin_half_extents.y, 0.0));
        Some(Aabb::new(
            center,
            Vec3::new(self.layout.cabin_half_extents.x, self.layout.cabin_half_extents.y, 0.1),
        ))
    }

    /// Opens the door at `floor` and makes it the door to watch.
    pub fn open_door(&mut self, floor: Floor) -> SyncResult<()> {
        self.watched = Some(floor);
        self.door_mut(floor).open()
    }

    pub fn force_close(&mut self, floor: Floor) -> SyncResult<()> {
        self.door_mut(floor).force_close()
    }

    /// Someone outside pressed the call button at `floor`.
    pub fn try_open_from(&mut self, floor: Floor) -> SyncResult<()> {
        if self.current_floor() == Some(floor) && self.occupancy == 0 {
            return self.open_door(floor);
        }
        self.request_cabin_to_floor(floor).map(|_| ())
    }

    /// Summons the cabin to `floor`. Returns whether a move was scheduled.
    /// Requests arriving while the cabin moves are dropped, not queued.
    pub fn request_cabin_to_floor(&mut self, floor: Floor) -> SyncResult<bool> {
        let Some(current) = self.current_floor() else {
            debug!("Cabin is moving, ignoring call from {:?}", floor);
            return Ok(false);
        };

        if current == floor {
            if self.occupancy == 0 {
                return Ok(false);
            }
            // Riders inside want the other floor.
            self.pending = Some(floor.opposite());
            self.watched = Some(floor);
            self.force_close(floor)?;
            return Ok(true);
        }

        self.pending = Some(floor);
        self.watched = Some(current);
        self.force_close(current)?;
        Ok(true)
    }

    /// Button inside the cabin.
    pub fn request_other_floor(&mut self) -> SyncResult<bool> {
        let Some(current) = self.current_floor() else {
            return Ok(false);
        };
        self.pending = Some(current.opposite());
        self.watched = Some(current);
        self.force_close(current)?;
        Ok(true)
    }

    /// A door finished closing. Starts the cabin when it is the watched door
    /// and a target is pending.
    pub fn notify_door_closed(&mut self, floor: Floor) -> bool {
        if self.watched != Some(floor) {
            debug!("Ignoring close of {:?} door, watching {:?}", floor, self.watched);
            return false;
        }
        if self.is_moving() {
            return false;
        }
        match self.pending {
            Some(target) if Some(target) != self.current_floor() => {
                info!("Elevator leaving for {:?}", target);
                self.motion = CabinMotion::Moving { to: target };
                true
            }
            _ => false,
        }
    }

    /// Advances doors, then the cabin.
    pub fn tick(&mut self, session: &mut Session, dt: f32) -> SyncResult<()> {
        let now = session.now();
        let params = self.params;

        let mut closed = Vec::new();
        for door in self.doors.iter_mut() {
            if door.advance(now, dt, &params)? {
                closed.push(door.floor);
            }
        }
        for floor in closed {
            self.notify_door_closed(floor);
        }

        if let CabinMotion::Moving { to } = self.motion {
            let target = self.layout.floor_pose(to);
            let pos = move_towards(self.cabin_position(), target, params.cabin_speed * dt);
            if pos.distance(&target) < ARRIVAL_EPSILON {
                self.arrive(to, session)?;
            } else {
                self.cabin.position.set(pos)?;
            }
        }
        Ok(())
    }

    fn arrive(&mut self, floor: Floor, session: &mut Session) -> SyncResult<()> {
        self.cabin.position.set(self.layout.floor_pose(floor))?;
        self.motion = CabinMotion::Idle(floor);
        self.pending = None;
        self.open_door(floor)?;
        info!("Elevator arrived at {:?}", floor);
        session.broadcast(
            self.cabin_id,
            Broadcast::SetIndicatorLights {
                at_bottom: floor == Floor::Bottom,
            },
        );
        Ok(())
    }

    pub fn drain_updates(&mut self, out: &mut Vec<FieldUpdate>) {
        self.cabin.drain_updates(self.cabin_id, out);
        for door in self.doors.iter_mut() {
            door.fields.drain_updates(door.id, out);
        }
    }

    /// Snapshot of one of the elevator's entities.
    pub fn snapshot(&self, entity: EntityId, out: &mut Vec<FieldUpdate>) {
        if entity == self.cabin_id {
            self.cabin.snapshot(entity, out);
        } else if let Some(door) = self.doors.iter().find(|d| d.id == entity) {
            door.fields.snapshot(entity, out);
        }
    }
}
