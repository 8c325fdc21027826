//! The Beetle registry: the device table, event-handler fan-out, and the
//! map/unmap/add/remove operations that keep every device's HAT and
//! subscriber state consistent as devices come and go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use crate::access::AccessControl;
use crate::device::{Device, DeviceId, DeviceIdAllocator};
use crate::internal_device::BeetleInternal;
use crate::router::Router;
use crate::transport::NetworkDiscoveryClient;

pub const DEFAULT_NUM_WORKERS: usize = 8;
pub const DEFAULT_NUM_WRITERS: usize = 4;
pub const DEFAULT_NUM_READERS: usize = 4;

pub type AddDeviceHandler = Arc<dyn Fn(DeviceId) + Send + Sync>;
pub type RemoveDeviceHandler = Arc<dyn Fn(DeviceId) + Send + Sync>;
pub type UpdateDeviceHandler = Arc<dyn Fn(DeviceId) + Send + Sync>;
pub type MapDevicesHandler = Arc<dyn Fn(DeviceId, DeviceId) + Send + Sync>;
pub type UnmapDevicesHandler = Arc<dyn Fn(DeviceId, DeviceId) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    add: Vec<AddDeviceHandler>,
    remove: Vec<RemoveDeviceHandler>,
    update: Vec<UpdateDeviceHandler>,
    map: Vec<MapDevicesHandler>,
    unmap: Vec<UnmapDevicesHandler>,
}

pub struct Beetle {
    pub name: String,
    pub devices: RwLock<HashMap<DeviceId, Arc<Device>>>,
    pub router: Router,
    pub beetle_device: Arc<BeetleInternal>,
    access_control: Mutex<Option<Arc<dyn AccessControl>>>,
    discovery_client: Mutex<Option<Arc<dyn NetworkDiscoveryClient>>>,
    handlers: Mutex<Handlers>,
    id_allocator: DeviceIdAllocator,
    workers: crate::sync::ThreadPool,
    pub writers: crate::sync::OrderedThreadPool,
}

impl Beetle {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_pool_sizes(name, DEFAULT_NUM_WORKERS, DEFAULT_NUM_WRITERS)
    }

    pub fn with_pool_sizes(name: impl Into<String>, num_workers: usize, num_writers: usize) -> Arc<Self> {
        let name = name.into();
        let beetle_device = Arc::new(BeetleInternal::new(name.clone()));
        let mut devices = HashMap::new();
        devices.insert(DeviceId::BEETLE, beetle_device.device().clone());

        Arc::new(Beetle {
            name,
            devices: RwLock::new(devices),
            router: Router::new(),
            beetle_device,
            access_control: Mutex::new(None),
            discovery_client: Mutex::new(None),
            handlers: Mutex::new(Handlers::default()),
            id_allocator: DeviceIdAllocator::default(),
            workers: crate::sync::ThreadPool::new(num_workers),
            writers: crate::sync::OrderedThreadPool::new(num_writers),
        })
    }

    pub fn next_device_id(&self) -> DeviceId {
        self.id_allocator.next()
    }

    pub fn access_control(&self) -> Option<Arc<dyn AccessControl>> {
        self.access_control.lock().unwrap().clone()
    }

    pub fn set_access_control(&self, ac: Arc<dyn AccessControl>) {
        let mut slot = self.access_control.lock().unwrap();
        assert!(slot.is_none(), "access control may only be set once");
        *slot = Some(ac);
    }

    pub fn set_discovery_client(&self, client: Arc<dyn NetworkDiscoveryClient>) {
        let mut slot = self.discovery_client.lock().unwrap();
        assert!(slot.is_none(), "discovery client may only be set once");
        *slot = Some(client);
    }

    pub fn discovery_client(&self) -> Option<Arc<dyn NetworkDiscoveryClient>> {
        self.discovery_client.lock().unwrap().clone()
    }

    pub fn register_add_device_handler(&self, h: AddDeviceHandler) {
        self.handlers.lock().unwrap().add.push(h);
    }

    pub fn register_remove_device_handler(&self, h: RemoveDeviceHandler) {
        self.handlers.lock().unwrap().remove.push(h);
    }

    pub fn register_update_device_handler(&self, h: UpdateDeviceHandler) {
        self.handlers.lock().unwrap().update.push(h);
    }

    pub fn register_map_devices_handler(&self, h: MapDevicesHandler) {
        self.handlers.lock().unwrap().map.push(h);
    }

    pub fn register_unmap_devices_handler(&self, h: UnmapDevicesHandler) {
        self.handlers.lock().unwrap().unmap.push(h);
    }

    /// Inserts `d` under an exclusive lock, then downgrades to a shared lock
    /// it hands back to the caller -- this is what lets the caller safely run
    /// `d.start()` (which may block on synchronous discovery transactions)
    /// while the registry stays readable, without racing a concurrent
    /// removal of `d` before `start()` completes.
    pub fn add_device(self: &Arc<Self>, d: Arc<Device>) -> RwLockReadGuard<'_, HashMap<DeviceId, Arc<Device>>> {
        let id = d.id();
        {
            let mut devices = self.devices.write().unwrap();
            devices.insert(id, d);
        }
        let handlers = self.handlers.lock().unwrap().add.clone();
        for h in handlers {
            self.workers.schedule(move || h(id));
        }
        self.devices.read().unwrap()
    }

    /// Refuses `DeviceId::BEETLE`. Unsubscribes `id` from every device it had
    /// subscriptions on, frees `id`'s block on every device that had mapped
    /// it (firing a service-changed indication for each), then fires remove
    /// handlers.
    pub fn remove_device(self: &Arc<Self>, id: DeviceId) {
        if id == DeviceId::BEETLE {
            log::warn!("not allowed to remove Beetle");
            return;
        }
        let removed = {
            let mut devices = self.devices.write().unwrap();
            match devices.remove(&id) {
                Some(d) => d,
                None => {
                    log::warn!("removing non-existent device {:?}", id);
                    return;
                }
            }
        };

        let servers = removed.hat.lock().unwrap().devices();
        {
            let devices = self.devices.read().unwrap();
            for server in servers {
                if let Some(server_device) = devices.get(&server) {
                    server_device.unsubscribe_all(id);
                }
            }
        }

        {
            let devices = self.devices.read().unwrap();
            for (other_id, other_device) in devices.iter() {
                debug_assert!(*other_id != id);
                let freed = {
                    let mut hat = other_device.hat.lock().unwrap();
                    if hat.device_range(id).is_null() {
                        continue;
                    }
                    hat.free(id)
                };
                self.beetle_device.inform_services_changed(&devices, freed, *other_id);
            }
        }

        let handlers = self.handlers.lock().unwrap().remove.clone();
        for h in handlers {
            self.workers.schedule(move || h(id));
        }
    }

    pub fn update_device(&self, id: DeviceId) {
        let handlers = self.handlers.lock().unwrap().update.clone();
        for h in handlers {
            self.workers.schedule(move || h(id));
        }
    }

    /// Rejects Beetle/NULL/self. Reserves a block for `from` in `to`'s HAT
    /// unless one is already reserved, in which case this is a no-op.
    pub fn map_devices(&self, from: DeviceId, to: DeviceId) {
        if from == DeviceId::BEETLE || to == DeviceId::BEETLE {
            log::warn!("not allowed to map Beetle");
            return;
        }
        if from == DeviceId::NULL || to == DeviceId::NULL {
            log::warn!("not allowed to map the null device");
            return;
        }
        if from == to {
            log::warn!("cannot map a device to itself");
            return;
        }
        let devices = self.devices.read().unwrap();
        let (Some(from_d), Some(to_d)) = (devices.get(&from), devices.get(&to)) else {
            log::warn!("map_devices: {:?} or {:?} does not name a device", from, to);
            return;
        };
        if let Some(ac) = self.access_control() {
            if !ac.can_map(from_d, to_d) {
                log::warn!("map_devices: permission denied for {:?} -> {:?}", from, to);
                return;
            }
        }
        {
            let mut hat = to_d.hat.lock().unwrap();
            if !hat.device_range(from).is_null() {
                log::warn!("{:?} is already mapped into {:?}'s space", from, to);
                return;
            }
            hat.reserve(from);
        }
        let handlers = self.handlers.lock().unwrap().map.clone();
        for h in handlers {
            self.workers.schedule(move || h(from, to));
        }
    }

    pub fn unmap_devices(&self, from: DeviceId, to: DeviceId) {
        if from == DeviceId::BEETLE || to == DeviceId::BEETLE {
            log::warn!("not allowed to unmap Beetle");
            return;
        }
        if from == DeviceId::NULL || to == DeviceId::NULL {
            log::warn!("unmapping the null device is a no-op");
            return;
        }
        if from == to {
            log::warn!("cannot unmap a device from itself");
            return;
        }
        let devices = self.devices.read().unwrap();
        let Some(to_d) = devices.get(&to) else {
            log::warn!("unmap_devices: {:?} does not name a device", to);
            return;
        };
        to_d.hat.lock().unwrap().free(from);
        let handlers = self.handlers.lock().unwrap().unmap.clone();
        for h in handlers {
            self.workers.schedule(move || h(from, to));
        }
    }
}
